use crate::models::{OpenPosition, OrderReceipt, OrderSide, OrderSizing};
use async_trait::async_trait;

/// Places orders and reports spendable balance
#[async_trait]
pub trait OrderSubmitter: Send + Sync {
    async fn submit(
        &self,
        instrument: &str,
        side: OrderSide,
        sizing: OrderSizing,
    ) -> anyhow::Result<OrderReceipt>;

    /// Quote currency available for new entries
    async fn available_balance(&self) -> anyhow::Result<f64>;
}

/// Snapshot of held positions with their unrealized return
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn open_positions(&self) -> anyhow::Result<Vec<OpenPosition>>;
}
