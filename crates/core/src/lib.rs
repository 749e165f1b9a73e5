pub mod config;
pub mod config_loader;
pub mod events;
pub mod ledger;
pub mod traits;

pub use config::{
    AppConfig, ExecutionConfig, ForecastConfig, IndicatorConfig, RiskConfig, ScoringConfig,
};
pub use config_loader::ConfigLoader;
pub use events::{
    Bar, Decision, ExecutionReport, FeedEvent, OrderRequest, OrderSide, OrderStatus, Signal, Tick,
};
pub use ledger::{LedgerError, Position, RiskLedger, SizedOrder, TradeRecord};
pub use traits::{ExecutionGateway, ForecastProvider, MarketFeed, SignalHook};
