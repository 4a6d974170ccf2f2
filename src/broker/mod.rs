pub mod dhan;

pub use dhan::DhanClient;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::OptionSide;

/// Order placement capability. Implementations must be safe to share across
/// the control loop and monitor tasks.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Submit an order and return the broker's order id.
    async fn place_order(
        &self,
        identifier: &str,
        qty: u32,
        side: OptionSide,
        price: f64,
    ) -> Result<String>;

    /// Square off a previously placed order.
    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Last traded price for an instrument, when the venue has one.
    async fn get_quote(&self, identifier: &str) -> Result<Option<f64>>;
}
