use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::execution::{OrderSubmitter, PositionSource, PriceLookup};
use crate::lock;
use crate::models::{OpenPosition, OrderReceipt, OrderSide, OrderSizing};

#[derive(Debug, Clone)]
pub struct PaperPosition {
    pub id: Uuid,
    pub instrument: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub last_price: f64, // Most recent mark, used when a lookup fails
}

impl PaperPosition {
    pub fn unrealized_return_pct(&self) -> f64 {
        (self.last_price - self.entry_price) / self.entry_price * 100.0
    }
}

#[derive(Debug)]
struct PaperBook {
    cash: f64,
    positions: Vec<PaperPosition>,
    fills: Vec<OrderReceipt>,
    realized_pnl: f64,
}

/// In-memory dry-run broker
///
/// Fills every order at the current looked-up price. One open position per
/// instrument; sells always liquidate the whole position.
pub struct PaperBroker {
    book: Mutex<PaperBook>,
    prices: Arc<dyn PriceLookup>,
}

impl PaperBroker {
    pub fn new(initial_cash: f64, prices: Arc<dyn PriceLookup>) -> Self {
        Self {
            book: Mutex::new(PaperBook {
                cash: initial_cash,
                positions: Vec::new(),
                fills: Vec::new(),
                realized_pnl: 0.0,
            }),
            prices,
        }
    }

    pub fn cash(&self) -> f64 {
        lock(&self.book).cash
    }

    pub fn realized_pnl(&self) -> f64 {
        lock(&self.book).realized_pnl
    }

    pub fn positions(&self) -> Vec<PaperPosition> {
        lock(&self.book).positions.clone()
    }

    pub fn has_open_position(&self, instrument: &str) -> bool {
        lock(&self.book)
            .positions
            .iter()
            .any(|p| p.instrument == instrument)
    }

    /// Every filled order, oldest first
    pub fn fills(&self) -> Vec<OrderReceipt> {
        lock(&self.book).fills.clone()
    }

    fn buy(&self, instrument: &str, amount: f64, price: f64) -> anyhow::Result<OrderReceipt> {
        let mut book = lock(&self.book);

        if book.positions.iter().any(|p| p.instrument == instrument) {
            anyhow::bail!("Already have open position for {}", instrument);
        }
        if amount <= 0.0 || amount > book.cash {
            anyhow::bail!(
                "Insufficient cash for {}: need {:.2}, have {:.2}",
                instrument,
                amount,
                book.cash
            );
        }

        let quantity = amount / price;
        let now = Utc::now();
        book.cash -= amount;
        book.positions.push(PaperPosition {
            id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            entry_price: price,
            quantity,
            entry_time: now,
            last_price: price,
        });

        let receipt = OrderReceipt {
            order_id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            side: OrderSide::Buy,
            price: Some(price),
            quantity: Some(quantity),
            submitted_at: now,
        };
        book.fills.push(receipt.clone());
        Ok(receipt)
    }

    fn sell(&self, instrument: &str, price: f64) -> anyhow::Result<OrderReceipt> {
        let mut book = lock(&self.book);

        let idx = book
            .positions
            .iter()
            .position(|p| p.instrument == instrument)
            .ok_or_else(|| anyhow::anyhow!("No position to sell for {}", instrument))?;
        let position = book.positions.remove(idx);

        let proceeds = position.quantity * price;
        let pnl = (price - position.entry_price) * position.quantity;
        book.cash += proceeds;
        book.realized_pnl += pnl;

        tracing::info!(
            "📄 Paper exit {} @ {:.4} (P&L {:+.2}, held since {})",
            instrument,
            price,
            pnl,
            position.entry_time.format("%H:%M:%S")
        );

        let receipt = OrderReceipt {
            order_id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            side: OrderSide::Sell,
            price: Some(price),
            quantity: Some(position.quantity),
            submitted_at: Utc::now(),
        };
        book.fills.push(receipt.clone());
        Ok(receipt)
    }
}

#[async_trait]
impl OrderSubmitter for PaperBroker {
    async fn submit(
        &self,
        instrument: &str,
        side: OrderSide,
        sizing: OrderSizing,
    ) -> anyhow::Result<OrderReceipt> {
        let price = self.prices.lookup(instrument).await?;
        if !price.is_finite() || price <= 0.0 {
            anyhow::bail!("Invalid fill price {} for {}", price, instrument);
        }

        match (side, sizing) {
            (OrderSide::Buy, OrderSizing::Quote(amount)) => self.buy(instrument, amount, price),
            (OrderSide::Sell, OrderSizing::EntirePosition) => self.sell(instrument, price),
            (side, sizing) => anyhow::bail!("Unsupported paper order: {:?} {:?}", side, sizing),
        }
    }

    async fn available_balance(&self) -> anyhow::Result<f64> {
        Ok(self.cash())
    }
}

#[async_trait]
impl PositionSource for PaperBroker {
    /// Marks every position to the current price before reporting
    async fn open_positions(&self) -> anyhow::Result<Vec<OpenPosition>> {
        let held: Vec<String> = self
            .positions()
            .into_iter()
            .map(|p| p.instrument)
            .collect();

        let mut marks = Vec::with_capacity(held.len());
        for instrument in held {
            match self.prices.lookup(&instrument).await {
                Ok(price) if price.is_finite() && price > 0.0 => marks.push((instrument, price)),
                Ok(price) => tracing::warn!("Ignoring bad mark {} for {}", price, instrument),
                Err(e) => tracing::warn!("Mark for {} unavailable, using last: {:#}", instrument, e),
            }
        }

        let mut book = lock(&self.book);
        for (instrument, price) in marks {
            if let Some(position) = book
                .positions
                .iter_mut()
                .find(|p| p.instrument == instrument)
            {
                position.last_price = price;
            }
        }

        Ok(book
            .positions
            .iter()
            .map(|p| OpenPosition {
                instrument: p.instrument.clone(),
                unrealized_return_pct: p.unrealized_return_pct(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Price table that tests can move
    #[derive(Default)]
    struct MovablePrices(Mutex<HashMap<String, f64>>);

    impl MovablePrices {
        fn set(&self, instrument: &str, price: f64) {
            self.0.lock().unwrap().insert(instrument.to_string(), price);
        }
    }

    #[async_trait]
    impl PriceLookup for MovablePrices {
        async fn lookup(&self, instrument: &str) -> anyhow::Result<f64> {
            self.0
                .lock()
                .unwrap()
                .get(instrument)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("no price for {}", instrument))
        }
    }

    fn create_test_broker() -> (PaperBroker, Arc<MovablePrices>) {
        let prices = Arc::new(MovablePrices::default());
        prices.set("KRW-BTC", 100.0);
        prices.set("KRW-ETH", 50.0);
        (PaperBroker::new(10_000.0, prices.clone()), prices)
    }

    #[tokio::test]
    async fn test_buy_opens_position() {
        let (broker, _) = create_test_broker();

        let receipt = broker
            .submit("KRW-BTC", OrderSide::Buy, OrderSizing::Quote(1_000.0))
            .await
            .unwrap();

        assert_eq!(receipt.side, OrderSide::Buy);
        assert_eq!(receipt.quantity, Some(10.0));
        assert_eq!(broker.cash(), 9_000.0);
        assert!(broker.has_open_position("KRW-BTC"));
    }

    #[tokio::test]
    async fn test_prevent_duplicate_positions() {
        let (broker, _) = create_test_broker();
        broker
            .submit("KRW-BTC", OrderSide::Buy, OrderSizing::Quote(1_000.0))
            .await
            .unwrap();

        let result = broker
            .submit("KRW-BTC", OrderSide::Buy, OrderSizing::Quote(1_000.0))
            .await;

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Already have open position"));
    }

    #[tokio::test]
    async fn test_insufficient_cash() {
        let (broker, _) = create_test_broker();
        let result = broker
            .submit("KRW-BTC", OrderSide::Buy, OrderSizing::Quote(50_000.0))
            .await;

        assert!(result.is_err());
        assert_eq!(broker.cash(), 10_000.0);
    }

    #[tokio::test]
    async fn test_sell_realizes_pnl() {
        let (broker, prices) = create_test_broker();
        broker
            .submit("KRW-BTC", OrderSide::Buy, OrderSizing::Quote(1_000.0))
            .await
            .unwrap();

        // 10 units bought at 100, sold at 110
        prices.set("KRW-BTC", 110.0);
        let receipt = broker
            .submit("KRW-BTC", OrderSide::Sell, OrderSizing::EntirePosition)
            .await
            .unwrap();

        assert_eq!(receipt.quantity, Some(10.0));
        assert_eq!(broker.realized_pnl(), 100.0);
        assert_eq!(broker.cash(), 10_100.0);
        assert!(!broker.has_open_position("KRW-BTC"));
        assert_eq!(broker.fills().len(), 2);
    }

    #[tokio::test]
    async fn test_sell_without_position() {
        let (broker, _) = create_test_broker();
        let result = broker
            .submit("KRW-ETH", OrderSide::Sell, OrderSizing::EntirePosition)
            .await;

        assert!(result.unwrap_err().to_string().contains("No position"));
    }

    #[tokio::test]
    async fn test_unknown_price_fails_order() {
        let (broker, _) = create_test_broker();
        let result = broker
            .submit("KRW-DOGE", OrderSide::Buy, OrderSizing::Quote(100.0))
            .await;

        assert!(result.is_err());
        assert!(broker.fills().is_empty());
    }

    #[tokio::test]
    async fn test_open_positions_marked_to_market() {
        let (broker, prices) = create_test_broker();
        broker
            .submit("KRW-BTC", OrderSide::Buy, OrderSizing::Quote(1_000.0))
            .await
            .unwrap();
        broker
            .submit("KRW-ETH", OrderSide::Buy, OrderSizing::Quote(1_000.0))
            .await
            .unwrap();

        prices.set("KRW-BTC", 95.0);
        prices.set("KRW-ETH", 55.0);
        let positions = broker.open_positions().await.unwrap();

        let btc = positions.iter().find(|p| p.instrument == "KRW-BTC").unwrap();
        let eth = positions.iter().find(|p| p.instrument == "KRW-ETH").unwrap();
        assert!((btc.unrealized_return_pct - -5.0).abs() < 1e-9);
        assert!((eth.unrealized_return_pct - 10.0).abs() < 1e-9);
    }
}
