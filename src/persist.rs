use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::{EnrichedBar, OptionChainSnapshot, SignalRow};

const ENRICHED_FILE: &str = "enriched_history.json";
const CHAIN_FILE: &str = "option_chain.json";
const SIGNALS_FILE: &str = "signal_history.json";
const LIVENESS_FILE: &str = "heartbeat.txt";

/// Writes the per-cycle working datasets for the presentation layer. Write
/// failures are logged and swallowed; persistence never stalls the loop.
pub struct Persister {
    dir: PathBuf,
}

impl Persister {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Could not create assets dir {}: {}", dir.display(), e);
        }
        Self { dir }
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) {
        let path = self.dir.join(name);
        match serde_json::to_string_pretty(value) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    warn!("Write {} failed: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Serialize {} failed: {}", name, e),
        }
    }

    pub fn write_enriched_history(&self, rows: &[EnrichedBar]) {
        self.write_json(ENRICHED_FILE, &rows);
    }

    pub fn write_option_chain(&self, snapshot: &OptionChainSnapshot) {
        self.write_json(CHAIN_FILE, snapshot);
    }

    pub fn write_signal_history(&self, rows: &[SignalRow]) {
        self.write_json(SIGNALS_FILE, &rows);
    }

    /// Liveness marker: the wall time of the last completed cycle.
    pub fn touch_liveness(&self, tick_time: &str) {
        let path = self.dir.join(LIVENESS_FILE);
        if let Err(e) = fs::write(&path, tick_time) {
            warn!("Liveness marker write failed: {}", e);
        }
    }
}
