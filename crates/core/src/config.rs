use serde::{Deserialize, Serialize};

/// Session configuration. Loaded once at startup and treated as immutable
/// for the lifetime of the trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Instruments to trade.
    pub symbols: Vec<String>,
    /// Starting capital for the session, in account currency.
    pub initial_capital: f64,
    /// Bar duration in seconds.
    pub bar_secs: u64,
    /// Finalized bars retained per symbol. Defaults to a full NYSE session
    /// of one-minute bars so session-cumulative VWAP stays exact.
    pub retention_bars: usize,
    pub indicators: IndicatorConfig,
    pub scoring: ScoringConfig,
    pub risk: RiskConfig,
    pub forecast: ForecastConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_short_period: usize,
    pub ema_long_period: usize,
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub atr_period: usize,
}

impl IndicatorConfig {
    /// Bars required before any signal can be scored.
    #[must_use]
    pub fn max_lookback(&self) -> usize {
        self.ema_long_period
            .max(self.rsi_period)
            .max(self.bb_period)
            .max(self.atr_period)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub ema_cross_weight: f64,
    pub oscillator_weight: f64,
    pub band_breakout_weight: f64,
    pub vwap_breakout_weight: f64,
    pub forecast_weight: f64,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    /// Forecast score magnitude below which the forecast is ignored.
    pub forecast_epsilon: f64,
}

/// All percentage fields are fractions (0.02 = 2%).
///
/// Per-position stop/target fractions and daily session limits are
/// independent knobs; one is never derived from the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Cap on a single position's notional as a fraction of capital.
    pub max_position_fraction: f64,
    /// Fallback stop distance when no volatility reading is available.
    pub stop_loss_pct: f64,
    /// Fallback take-profit distance when no volatility reading is available.
    pub take_profit_pct: f64,
    /// Session profit fraction at which new entries stop.
    pub daily_target_pct: f64,
    /// Session drawdown fraction at which new entries stop.
    pub daily_max_loss_pct: f64,
    /// Stop distance as a multiple of the volatility range (ATR).
    pub atr_stop_multiplier: f64,
    /// Take-profit distance as a multiple of the volatility range (ATR).
    pub atr_take_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Prediction endpoint URL. Empty disables the REST forecast entirely.
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Commission as a fraction of notional (0.001 = 0.1%).
    pub commission_rate: f64,
    /// Simulated slippage in basis points, applied toward the order side.
    pub slippage_bps: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["AAPL".to_string()],
            initial_capital: 100_000.0,
            bar_secs: 60,
            retention_bars: 390,
            indicators: IndicatorConfig::default(),
            scoring: ScoringConfig::default(),
            risk: RiskConfig::default(),
            forecast: ForecastConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_short_period: 5,
            ema_long_period: 10,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            bb_period: 20,
            bb_std_dev: 2.0,
            atr_period: 14,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ema_cross_weight: 1.0,
            oscillator_weight: 0.5,
            band_breakout_weight: 0.7,
            vwap_breakout_weight: 0.5,
            forecast_weight: 1.0,
            buy_threshold: 1.5,
            sell_threshold: 1.5,
            forecast_epsilon: 0.005,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_fraction: 0.20,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
            daily_target_pct: 0.02,
            daily_max_loss_pct: 0.03,
            atr_stop_multiplier: 2.0,
            atr_take_multiplier: 4.0,
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: 5,
            max_retries: 3,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            commission_rate: 0.001,
            slippage_bps: 5.0,
        }
    }
}
