use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single timestamped trade event, consumed into the bar aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
}

/// A fixed-duration OHLCV aggregate. Immutable once finalized; per-symbol
/// sequences are strictly increasing by `open_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// What a market feed yields: raw ticks to aggregate, or pre-formed bars
/// from a historical source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeedEvent {
    Tick(Tick),
    Bar(Bar),
}

impl FeedEvent {
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Tick(t) => t.timestamp,
            Self::Bar(b) => b.open_time,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Tick(t) => &t.symbol,
            Self::Bar(b) => &b.symbol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Buy,
    Sell,
    SellStopLoss,
    SellTakeProfit,
    Hold,
}

impl Decision {
    /// True for every decision that closes an existing position.
    #[must_use]
    pub const fn is_exit(self) -> bool {
        matches!(self, Self::Sell | Self::SellStopLoss | Self::SellTakeProfit)
    }
}

/// One evaluation cycle's outcome for a symbol. Produced fresh each cycle,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub decision: Decision,
    pub price: Decimal,
    pub quantity: u64,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    #[must_use]
    pub fn hold(symbol: &str, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            decision: Decision::Hold,
            price,
            quantity: 0,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order intent handed to an execution gateway for non-HOLD signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub filled_quantity: u64,
    pub average_price: Decimal,
    pub commission: Decimal,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}
