use thiserror::Error;

/// Failure taxonomy for the strategy core. Every variant is recoverable at
/// the call site that observes it; none may escape the control loop or a
/// monitor task.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Market data or OI snapshot fetch failed or came back empty. Skip the
    /// affected step for this cycle.
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    /// No broker configured, or a broker call failed.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Malformed price history. Fatal to this cycle's indicator run only.
    #[error("invalid price history: {0}")]
    InvalidInput(String),

    /// An identifier already has an open trade. Entry-gate logic bug;
    /// log and skip.
    #[error("trade already open for {0}")]
    DuplicateTrade(String),
}
