//! The per-cycle orchestrator.
//!
//! Drives the pipeline in one direction per bar close: aggregation →
//! indicators → forecast → scoring → ledger mutation → gateway. The
//! ledger is the only shared state; every mutation happens under its
//! mutex with the lock scope limited to that mutation, and never across
//! the forecast call or the gateway await.

use anyhow::Result;
use chrono::Utc;
use intraday_core::config::AppConfig;
use intraday_core::events::{Bar, Decision, FeedEvent, OrderRequest, OrderSide, Signal};
use intraday_core::ledger::{LedgerError, RiskLedger};
use intraday_core::traits::{ExecutionGateway, ForecastProvider, MarketFeed, SignalHook};
use intraday_data::BarAggregator;
use intraday_strategy::SignalScorer;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

pub struct TradingEngine<F, G>
where
    F: MarketFeed,
    G: ExecutionGateway,
{
    feed: F,
    gateway: G,
    forecast: Arc<dyn ForecastProvider>,
    aggregator: BarAggregator,
    scorer: SignalScorer,
    ledger: Arc<Mutex<RiskLedger>>,
    hooks: Vec<Arc<dyn SignalHook>>,
    config: AppConfig,
    /// Symbols removed from processing after an invariant violation.
    halted_symbols: HashSet<String>,
    shutdown: watch::Receiver<bool>,
}

impl<F, G> TradingEngine<F, G>
where
    F: MarketFeed,
    G: ExecutionGateway,
{
    /// # Errors
    ///
    /// Returns an error if the risk configuration cannot be converted into
    /// ledger arithmetic.
    pub fn new(
        config: AppConfig,
        feed: F,
        gateway: G,
        forecast: Arc<dyn ForecastProvider>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let initial_capital = Decimal::try_from(config.initial_capital)?;
        let ledger = RiskLedger::new(&config.risk, initial_capital)?;
        let scorer = SignalScorer::new(config.scoring.clone(), &config.indicators);
        let aggregator = BarAggregator::new(config.bar_secs, config.retention_bars);

        Ok(Self {
            feed,
            gateway,
            forecast,
            aggregator,
            scorer,
            ledger: Arc::new(Mutex::new(ledger)),
            hooks: Vec::new(),
            config,
            halted_symbols: HashSet::new(),
            shutdown,
        })
    }

    /// Registers an observer invoked around every signal evaluation, in
    /// registration order.
    pub fn add_hook(&mut self, hook: Arc<dyn SignalHook>) {
        self.hooks.push(hook);
    }

    /// Shared handle to the ledger, for reporting after the run.
    #[must_use]
    pub fn ledger(&self) -> Arc<Mutex<RiskLedger>> {
        Arc::clone(&self.ledger)
    }

    /// Count of out-of-order events dropped for `symbol`.
    #[must_use]
    pub fn dropped_ticks(&self, symbol: &str) -> u64 {
        self.aggregator.dropped_ticks(symbol)
    }

    /// Consumes the feed until exhaustion or shutdown, then liquidates all
    /// open positions at the latest known price.
    ///
    /// # Errors
    ///
    /// Returns an error only on feed failure; routine rejections and
    /// per-symbol invariant halts are handled internally.
    pub async fn run(&mut self) -> Result<()> {
        let mut shutdown_open = true;
        loop {
            tokio::select! {
                changed = self.shutdown.changed(), if shutdown_open => {
                    if changed.is_err() {
                        // Sender gone: no shutdown can ever arrive, so stop
                        // polling this branch and keep draining the feed.
                        shutdown_open = false;
                    } else if *self.shutdown.borrow() {
                        tracing::info!("shutdown requested; liquidating");
                        break;
                    }
                }
                event = self.feed.next_event() => {
                    let Some(event) = event? else {
                        tracing::info!("feed exhausted; liquidating");
                        break;
                    };
                    self.handle_event(event).await?;
                }
            }
        }

        self.liquidate().await;
        Ok(())
    }

    async fn handle_event(&mut self, event: FeedEvent) -> Result<()> {
        let closed = match event {
            FeedEvent::Tick(tick) => self.aggregator.ingest(&tick),
            FeedEvent::Bar(bar) => self.aggregator.append_bar(bar.clone()).then_some(bar),
        };
        if let Some(bar) = closed {
            self.on_bar_close(&bar).await?;
        }
        Ok(())
    }

    /// One evaluation cycle for a symbol whose bar just closed. Bar
    /// finalization happened before this call, so the indicator input is a
    /// stable, fully finalized sequence.
    async fn on_bar_close(&mut self, bar: &Bar) -> Result<()> {
        let symbol = bar.symbol.clone();
        if self.halted_symbols.contains(&symbol) {
            return Ok(());
        }

        let bars = self.aggregator.bars(&symbol);
        let rows = intraday_signals::compute(bars, &self.config.indicators);

        // The forecast may block and retry; the ledger lock is not held here.
        let recent_start = bars
            .len()
            .saturating_sub(self.config.indicators.ema_long_period * 2);
        let forecast_score = match self.forecast.predict(&symbol, &bars[recent_start..]).await {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "forecast degraded to neutral");
                0.0
            }
        };

        for hook in &self.hooks {
            hook.before_signal(&symbol, bars);
        }

        let signal = {
            let ledger = self.ledger.lock().await;
            self.scorer
                .evaluate(&symbol, bar.close, &rows, forecast_score, &ledger, bar.open_time)
        };

        for hook in &self.hooks {
            hook.after_signal(&signal);
        }

        self.apply(&signal, rows.last().and_then(|r| r.atr)).await
    }

    async fn apply(&mut self, signal: &Signal, volatility: Option<f64>) -> Result<()> {
        // Lock scope covers only the ledger mutation; the gateway await and
        // the invariant handling below run with the lock released.
        let outcome: Result<Option<(OrderSide, u64)>, LedgerError> = match signal.decision {
            Decision::Hold => Ok(None),
            Decision::Buy => {
                // Re-derive the full sized order (stop/take levels) under
                // the lock; the signal's quantity came from the same inputs.
                let volatility = volatility.and_then(|v| Decimal::try_from(v).ok());
                let mut ledger = self.ledger.lock().await;
                match ledger.compute_size(signal.price, volatility) {
                    None => {
                        tracing::info!(symbol = %signal.symbol, "entry sized below one share; skipped");
                        Ok(None)
                    }
                    Some(sized) => ledger
                        .open(&signal.symbol, signal.price, sized, signal.timestamp)
                        .map(|opened| opened.then_some((OrderSide::Buy, sized.quantity))),
                }
            }
            Decision::Sell | Decision::SellStopLoss | Decision::SellTakeProfit => {
                let mut ledger = self.ledger.lock().await;
                ledger
                    .close(&signal.symbol, signal.price, signal.timestamp)
                    .map(|profit| profit.map(|_| (OrderSide::Sell, signal.quantity)))
            }
        };

        let order = match outcome {
            Ok(Some((side, quantity))) => Some(self.order_from(signal, side, quantity)),
            Ok(None) => None,
            Err(e) => {
                self.halt_symbol(&signal.symbol, &e);
                None
            }
        };

        if let Some(order) = order {
            // Paper semantics: the ledger already reflects the expected
            // fill; the report is informational only.
            let report = self.gateway.send_order(order).await?;
            tracing::debug!(order_id = %report.order_id, status = ?report.status, "gateway report");
        }

        let mut ledger = self.ledger.lock().await;
        ledger.check_daily_targets();
        Ok(())
    }

    fn order_from(&self, signal: &Signal, side: OrderSide, quantity: u64) -> OrderRequest {
        OrderRequest {
            symbol: signal.symbol.clone(),
            side,
            quantity,
            price: signal.price,
            timestamp: signal.timestamp,
        }
    }

    fn halt_symbol(&mut self, symbol: &str, error: &LedgerError) {
        tracing::error!(symbol, error = %error, "ledger invariant violation; halting symbol");
        self.halted_symbols.insert(symbol.to_string());
    }

    /// Closes every open position at the freshest known price. Runs to
    /// completion before the engine returns so no position is left
    /// untracked.
    async fn liquidate(&mut self) {
        let now = Utc::now();
        let mut ledger = self.ledger.lock().await;

        let mut prices: HashMap<String, Decimal> = HashMap::new();
        for symbol in ledger.open_symbols() {
            // Flush any open window so the price reflects the last trade.
            self.aggregator.try_finalize(&symbol, now);
            if let Some(price) = self.aggregator.latest_price(&symbol) {
                prices.insert(symbol, price);
            }
        }

        let closed = ledger.liquidate_all(|symbol| prices.get(symbol).copied());
        for record in &closed {
            tracing::info!(
                symbol = %record.symbol,
                exit = %record.exit_price,
                profit = %record.profit,
                "position liquidated at session end"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use intraday_core::config::{IndicatorConfig, RiskConfig};
    use intraday_core::events::{ExecutionReport, OrderStatus};
    use intraday_data::VecFeed;
    use intraday_forecast::NeutralForecast;
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    /// Gateway that records orders instead of filling them anywhere.
    #[derive(Default)]
    struct RecordingGateway {
        orders: Arc<StdMutex<Vec<OrderRequest>>>,
    }

    #[async_trait]
    impl ExecutionGateway for RecordingGateway {
        async fn send_order(&mut self, order: OrderRequest) -> Result<ExecutionReport> {
            let report = ExecutionReport {
                order_id: format!("test-{}", order.symbol),
                symbol: order.symbol.clone(),
                side: order.side,
                filled_quantity: order.quantity,
                average_price: order.price,
                commission: Decimal::ZERO,
                status: OrderStatus::Filled,
                timestamp: order.timestamp,
            };
            self.orders.lock().unwrap().push(order);
            Ok(report)
        }
    }

    struct BullishForecast;

    #[async_trait]
    impl ForecastProvider for BullishForecast {
        async fn predict(&self, _symbol: &str, _recent_bars: &[Bar]) -> Result<f64> {
            Ok(0.01)
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            symbols: vec!["AAPL".to_string()],
            initial_capital: 10_000.0,
            bar_secs: 60,
            retention_bars: 100,
            indicators: IndicatorConfig {
                ema_short_period: 3,
                ema_long_period: 5,
                rsi_period: 3,
                rsi_oversold: 30.0,
                rsi_overbought: 70.0,
                bb_period: 4,
                bb_std_dev: 2.0,
                atr_period: 3,
            },
            risk: RiskConfig {
                max_position_fraction: 0.5,
                ..RiskConfig::default()
            },
            ..AppConfig::default()
        }
    }

    fn bar(i: i64, close: Decimal) -> FeedEvent {
        FeedEvent::Bar(Bar {
            symbol: "AAPL".to_string(),
            open_time: Utc.timestamp_opt(i * 60, 0).unwrap(),
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume: dec!(1000),
        })
    }

    /// Flat closes, then a jump: the short EMA crosses above the long one
    /// on the sixth bar and the close breaks above session VWAP, which
    /// together with the bullish forecast clears the buy threshold.
    fn bullish_bars() -> Vec<FeedEvent> {
        [100, 100, 101, 100, 100, 106]
            .iter()
            .enumerate()
            .map(|(i, &c)| bar(i as i64, Decimal::from(c)))
            .collect()
    }

    #[tokio::test]
    async fn ema_cross_with_forecast_opens_position() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let orders = Arc::new(StdMutex::new(Vec::new()));
        let gateway = RecordingGateway {
            orders: Arc::clone(&orders),
        };

        let mut engine = TradingEngine::new(
            test_config(),
            VecFeed::new(bullish_bars()),
            gateway,
            Arc::new(BullishForecast),
            shutdown_rx,
        )
        .unwrap();
        let ledger = engine.ledger();
        engine.run().await.unwrap();

        // Position opened at 106 (47 shares on a 5000 budget), then
        // liquidated flat at feed end.
        let ledger = ledger.lock().await;
        assert!(ledger.open_symbols().is_empty());
        assert_eq!(ledger.trade_history().len(), 1);
        let trade = &ledger.trade_history()[0];
        assert_eq!(trade.entry_price, dec!(106));
        assert_eq!(trade.exit_price, dec!(106));
        assert_eq!(trade.quantity, 47);
        assert_eq!(ledger.capital(), dec!(10000));

        let orders = orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert_eq!(orders[0].quantity, 47);
    }

    #[tokio::test]
    async fn stop_loss_bar_closes_position_and_latches_daily_loss() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let orders = Arc::new(StdMutex::new(Vec::new()));
        let gateway = RecordingGateway {
            orders: Arc::clone(&orders),
        };

        // Entry at 106 puts the ATR stop near 98.67; the 94 close breaches
        // it.
        let mut events = bullish_bars();
        events.push(bar(6, dec!(94)));

        let mut engine = TradingEngine::new(
            test_config(),
            VecFeed::new(events),
            gateway,
            Arc::new(BullishForecast),
            shutdown_rx,
        )
        .unwrap();
        let ledger = engine.ledger();
        engine.run().await.unwrap();

        let ledger = ledger.lock().await;
        assert_eq!(ledger.trade_history().len(), 1);
        let trade = &ledger.trade_history()[0];
        assert_eq!(trade.exit_price, dec!(94));
        // (94 - 106) x 47
        assert_eq!(trade.profit, dec!(-564));
        assert_eq!(ledger.capital(), dec!(9436));
        // 5.64% drawdown exceeds the 3% daily limit.
        assert!(ledger.is_halted());

        let orders = orders.lock().unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_does_not_abort_the_feed() {
        // Receiver whose sender is gone immediately: the run must still
        // drain the whole feed instead of treating the closed channel as a
        // shutdown request.
        let (_, shutdown_rx) = watch::channel(false);

        let mut engine = TradingEngine::new(
            test_config(),
            VecFeed::new(bullish_bars()),
            RecordingGateway::default(),
            Arc::new(NeutralForecast),
            shutdown_rx,
        )
        .unwrap();
        let ledger = engine.ledger();
        engine.run().await.unwrap();

        // All six bars were consumed: the sixth triggers the entry, which
        // is then liquidated at feed end.
        let ledger = ledger.lock().await;
        assert_eq!(ledger.trade_history().len(), 1);
        assert!(ledger.open_symbols().is_empty());
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_run() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let gateway = RecordingGateway::default();

        let mut engine = TradingEngine::new(
            test_config(),
            VecFeed::new(bullish_bars()),
            gateway,
            Arc::new(NeutralForecast),
            shutdown_rx,
        )
        .unwrap();

        shutdown_tx.send(true).unwrap();
        engine.run().await.unwrap();

        let ledger = engine.ledger();
        let ledger = ledger.lock().await;
        assert!(ledger.open_symbols().is_empty());
    }

    #[tokio::test]
    async fn hooks_observe_every_evaluation() {
        struct CountingHook {
            before: StdMutex<u32>,
            after: StdMutex<u32>,
        }
        impl SignalHook for CountingHook {
            fn before_signal(&self, _symbol: &str, _bars: &[Bar]) {
                *self.before.lock().unwrap() += 1;
            }
            fn after_signal(&self, _signal: &Signal) {
                *self.after.lock().unwrap() += 1;
            }
        }

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let hook = Arc::new(CountingHook {
            before: StdMutex::new(0),
            after: StdMutex::new(0),
        });

        let mut engine = TradingEngine::new(
            test_config(),
            VecFeed::new(bullish_bars()),
            RecordingGateway::default(),
            Arc::new(NeutralForecast),
            shutdown_rx,
        )
        .unwrap();
        engine.add_hook(hook.clone());
        engine.run().await.unwrap();

        // Six bars appended, six evaluations (HOLDs included).
        assert_eq!(*hook.before.lock().unwrap(), 6);
        assert_eq!(*hook.after.lock().unwrap(), 6);
    }
}
