//! Indicator computation over a finalized bar sequence.
//!
//! Everything here is a pure function of the input slice: recomputing from
//! scratch after appending a bar yields exactly the rows an incremental
//! recomputation would, so the engine can recompute freely on every close.
//!
//! Values are `None` until the indicator's warm-up window is filled; a
//! missing value is never encoded as zero.

use intraday_core::config::IndicatorConfig;
use intraday_core::events::Bar;
use rust_decimal::prelude::ToPrimitive;

/// Derived values for one bar, aligned 1:1 with the input sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub close: f64,
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub rsi: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub vwap: Option<f64>,
    pub atr: Option<f64>,
}

/// Computes all configured indicators for `bars`, one row per bar.
#[must_use]
pub fn compute(bars: &[Bar], config: &IndicatorConfig) -> Vec<IndicatorRow> {
    let closes: Vec<f64> = bars.iter().map(|b| decimal_f64(b.close)).collect();
    let highs: Vec<f64> = bars.iter().map(|b| decimal_f64(b.high)).collect();
    let lows: Vec<f64> = bars.iter().map(|b| decimal_f64(b.low)).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| decimal_f64(b.volume)).collect();

    let ema_short = ema(&closes, config.ema_short_period);
    let ema_long = ema(&closes, config.ema_long_period);
    let rsi = rsi(&closes, config.rsi_period);
    let (bb_upper, bb_middle, bb_lower) =
        bollinger(&closes, config.bb_period, config.bb_std_dev);
    let vwap = vwap(&closes, &volumes);
    let atr = atr(&highs, &lows, &closes, config.atr_period);

    (0..bars.len())
        .map(|i| IndicatorRow {
            close: closes[i],
            ema_short: ema_short[i],
            ema_long: ema_long[i],
            rsi: rsi[i],
            bb_upper: bb_upper[i],
            bb_middle: bb_middle[i],
            bb_lower: bb_lower[i],
            vwap: vwap[i],
            atr: atr[i],
        })
        .collect()
}

fn decimal_f64(value: rust_decimal::Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Exponential moving average with alpha = 2/(N+1), seeded by the simple
/// average of the first N values.
fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(seed);

    let mut prev = seed;
    for i in period..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = Some(prev);
    }
    out
}

/// RSI with Wilder smoothing of average gain and loss over N deltas.
/// First defined at index N; 100 when the average loss is zero.
fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss += -delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in period + 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let (gain, loss) = if delta > 0.0 {
            (delta, 0.0)
        } else {
            (0.0, -delta)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// SMA(N) of close ± k standard deviations (population) over the same
/// window. Returns (upper, middle, lower).
#[allow(clippy::type_complexity)]
fn bollinger(
    closes: &[f64],
    period: usize,
    std_dev: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let len = closes.len();
    let mut upper = vec![None; len];
    let mut middle = vec![None; len];
    let mut lower = vec![None; len];
    if period == 0 || len < period {
        return (upper, middle, lower);
    }

    for i in period - 1..len {
        let window = &closes[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance =
            window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let band = std_dev * variance.sqrt();
        middle[i] = Some(mean);
        upper[i] = Some(mean + band);
        lower[i] = Some(mean - band);
    }
    (upper, middle, lower)
}

/// Session-cumulative volume-weighted price: Σ(close×volume)/Σ(volume)
/// from the start of the supplied sequence.
fn vwap(closes: &[f64], volumes: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    let mut cumulative_pv = 0.0;
    let mut cumulative_vol = 0.0;
    for i in 0..closes.len() {
        cumulative_pv += closes[i] * volumes[i];
        cumulative_vol += volumes[i];
        if cumulative_vol > 0.0 {
            out[i] = Some(cumulative_pv / cumulative_vol);
        }
    }
    out
}

/// Average true range: TR = max(high−low, |high−prev_close|, |low−prev_close|),
/// seeded with the simple average of the first N true ranges, then Wilder
/// smoothed. Defined from index N onward (a TR needs a previous close).
fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let len = closes.len();
    let mut out = vec![None; len];
    if period == 0 || len <= period {
        return out;
    }

    let true_range = |i: usize| -> f64 {
        let prev_close = closes[i - 1];
        (highs[i] - lows[i])
            .max((highs[i] - prev_close).abs())
            .max((lows[i] - prev_close).abs())
    };

    let mut value = (1..=period).map(true_range).sum::<f64>() / period as f64;
    out[period] = Some(value);

    for i in period + 1..len {
        value = (value * (period as f64 - 1.0) + true_range(i)) / period as f64;
        out[i] = Some(value);
    }
    out
}
