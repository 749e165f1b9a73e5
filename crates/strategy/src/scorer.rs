//! Weighted multi-factor scoring.
//!
//! Each cycle is evaluated fresh from the latest two indicator rows plus
//! the external forecast score; nothing is carried between cycles. The
//! scorer reads the ledger (position, sizing approval) but never mutates
//! it.

use chrono::{DateTime, Utc};
use intraday_core::config::{IndicatorConfig, ScoringConfig};
use intraday_core::events::{Decision, Signal};
use intraday_core::ledger::RiskLedger;
use intraday_signals::IndicatorRow;
use rust_decimal::Decimal;

pub struct SignalScorer {
    scoring: ScoringConfig,
    rsi_oversold: f64,
    rsi_overbought: f64,
    /// Bars required before anything other than HOLD can be emitted.
    min_bars: usize,
}

impl SignalScorer {
    #[must_use]
    pub fn new(scoring: ScoringConfig, indicators: &IndicatorConfig) -> Self {
        Self {
            scoring,
            rsi_oversold: indicators.rsi_oversold,
            rsi_overbought: indicators.rsi_overbought,
            min_bars: indicators.max_lookback().max(2),
        }
    }

    /// Scores one symbol for this cycle and resolves the decision priority:
    /// stop-loss, take-profit, scored exit, approved entry, hold.
    #[must_use]
    pub fn evaluate(
        &self,
        symbol: &str,
        latest_close: Decimal,
        rows: &[IndicatorRow],
        forecast_score: f64,
        ledger: &RiskLedger,
        timestamp: DateTime<Utc>,
    ) -> Signal {
        let position = ledger.open_position(symbol);

        // Protective exits outrank everything, including a weak sell score.
        if let Some(pos) = position {
            if pos.stop_loss_hit(latest_close) {
                return Signal {
                    symbol: symbol.to_string(),
                    decision: Decision::SellStopLoss,
                    price: latest_close,
                    quantity: pos.quantity,
                    timestamp,
                };
            }
            if pos.take_profit_hit(latest_close) {
                return Signal {
                    symbol: symbol.to_string(),
                    decision: Decision::SellTakeProfit,
                    price: latest_close,
                    quantity: pos.quantity,
                    timestamp,
                };
            }
        }

        if rows.len() < self.min_bars {
            return Signal::hold(symbol, latest_close, timestamp);
        }
        let latest = &rows[rows.len() - 1];
        let prev = &rows[rows.len() - 2];

        let (buy_score, sell_score) = self.score(prev, latest, forecast_score);
        tracing::debug!(symbol, buy_score, sell_score, forecast_score, "cycle scored");

        if let Some(pos) = position {
            if sell_score >= self.scoring.sell_threshold {
                return Signal {
                    symbol: symbol.to_string(),
                    decision: Decision::Sell,
                    price: latest_close,
                    quantity: pos.quantity,
                    timestamp,
                };
            }
            return Signal::hold(symbol, latest_close, timestamp);
        }

        if buy_score >= self.scoring.buy_threshold && ledger.can_open(symbol, latest_close) {
            let volatility = latest.atr.and_then(|v| Decimal::try_from(v).ok());
            if let Some(sized) = ledger.compute_size(latest_close, volatility) {
                return Signal {
                    symbol: symbol.to_string(),
                    decision: Decision::Buy,
                    price: latest_close,
                    quantity: sized.quantity,
                    timestamp,
                };
            }
        }

        Signal::hold(symbol, latest_close, timestamp)
    }

    fn score(&self, prev: &IndicatorRow, latest: &IndicatorRow, forecast: f64) -> (f64, f64) {
        let w = &self.scoring;

        // A cross needs a sign change; touching averages are not a cross.
        let ema_cross_up = crossed_strict(
            pair(prev.ema_short, prev.ema_long),
            pair(latest.ema_short, latest.ema_long),
        );
        let ema_cross_down = crossed_strict(
            pair(prev.ema_long, prev.ema_short),
            pair(latest.ema_long, latest.ema_short),
        );

        let rsi_oversold = latest.rsi.map_or(false, |v| v < self.rsi_oversold);
        let rsi_overbought = latest.rsi.map_or(false, |v| v > self.rsi_overbought);

        let bb_break_up = crossed_above(
            pair(Some(prev.close), prev.bb_upper),
            pair(Some(latest.close), latest.bb_upper),
        );
        let bb_break_down = crossed_above(
            pair(prev.bb_lower, Some(prev.close)),
            pair(latest.bb_lower, Some(latest.close)),
        );

        let vwap_break_up = crossed_above(
            pair(Some(prev.close), prev.vwap),
            pair(Some(latest.close), latest.vwap),
        );
        let vwap_break_down = crossed_above(
            pair(prev.vwap, Some(prev.close)),
            pair(latest.vwap, Some(latest.close)),
        );

        let forecast_bullish = forecast > w.forecast_epsilon;
        let forecast_bearish = forecast < -w.forecast_epsilon;

        let mut buy_score = 0.0;
        let mut sell_score = 0.0;
        for (bullish, bearish, weight) in [
            (ema_cross_up, ema_cross_down, w.ema_cross_weight),
            (rsi_oversold, rsi_overbought, w.oscillator_weight),
            (bb_break_up, bb_break_down, w.band_breakout_weight),
            (vwap_break_up, vwap_break_down, w.vwap_breakout_weight),
            (forecast_bullish, forecast_bearish, w.forecast_weight),
        ] {
            if bullish {
                buy_score += weight;
            }
            if bearish {
                sell_score += weight;
            }
        }
        (buy_score, sell_score)
    }
}

fn pair(a: Option<f64>, b: Option<f64>) -> Option<(f64, f64)> {
    Some((a?, b?))
}

/// True when `a` was at or below `b` in the previous row and strictly above
/// it in the latest one. Breakout shape: starting on the line counts.
fn crossed_above(prev: Option<(f64, f64)>, latest: Option<(f64, f64)>) -> bool {
    match (prev, latest) {
        (Some((pa, pb)), Some((la, lb))) => pa <= pb && la > lb,
        _ => false,
    }
}

/// True when `a` was strictly below `b` in the previous row and strictly
/// above it in the latest one.
fn crossed_strict(prev: Option<(f64, f64)>, latest: Option<(f64, f64)>) -> bool {
    match (prev, latest) {
        (Some((pa, pb)), Some((la, lb))) => pa < pb && la > lb,
        _ => false,
    }
}
