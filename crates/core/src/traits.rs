use crate::events::{Bar, ExecutionReport, FeedEvent, OrderRequest, Signal};
use anyhow::Result;
use async_trait::async_trait;

/// Source of market events: a live tick feed, a historical replay, or a
/// simulator. Events must be yielded in non-decreasing timestamp order.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Returns the next event, or `None` when the feed is exhausted.
    async fn next_event(&mut self) -> Result<Option<FeedEvent>>;
}

/// External probabilistic forecast. `predict` returns the expected return
/// over the next bar as a plain fraction (0.01 = +1%).
///
/// Implementations own their retry policy; callers treat any error as a
/// neutral (0.0) score.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn predict(&self, symbol: &str, recent_bars: &[Bar]) -> Result<f64>;
}

/// Brokerage seam. The core only confirms the ledger already reflects the
/// expected fill; reconciliation against actual fills is out of scope.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn send_order(&mut self, order: OrderRequest) -> Result<ExecutionReport>;
}

/// Observer invoked around each signal evaluation. Hooks cannot affect the
/// decision; failures are the hook's own problem and must not panic.
pub trait SignalHook: Send + Sync {
    /// Called before a symbol is scored, once enough bars exist.
    fn before_signal(&self, _symbol: &str, _bars: &[Bar]) {}

    /// Called with the decision for this cycle, including HOLD.
    fn after_signal(&self, _signal: &Signal) {}
}
