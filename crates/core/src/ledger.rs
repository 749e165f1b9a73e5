use crate::config::RiskConfig;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// Invariant violations. Routine rejections (insufficient cash, no open
/// position, limits reached) are never errors; they come back as `false`
/// or `None`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// An open position already exists; the caller skipped `can_open`.
    #[error("position for {0} is already open")]
    PositionOpen(String),
    /// The position was already closed once; closing it again would
    /// double-count the P&L.
    #[error("position for {0} is already closed")]
    AlreadyClosed(String),
}

/// An open, sized trade with attached stop-loss/take-profit levels.
/// Created and mutated only by the ledger.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub entry_price: Decimal,
    pub quantity: u64,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub open: bool,
}

impl Position {
    #[must_use]
    pub fn stop_loss_hit(&self, current_price: Decimal) -> bool {
        current_price <= self.stop_loss_price
    }

    #[must_use]
    pub fn take_profit_hit(&self, current_price: Decimal) -> bool {
        current_price >= self.take_profit_price
    }
}

/// Closed-trade record appended to the session history on every close.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: u64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub profit: Decimal,
    pub capital_after: Decimal,
}

/// Result of position sizing: quantity plus the exit levels that go on
/// the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedOrder {
    pub quantity: u64,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
}

/// Single source of truth for capital, cash, open positions, and daily
/// performance. All mutation goes through `open` / `close` /
/// `liquidate_all`; callers serialize mutating access (one logical writer).
pub struct RiskLedger {
    capital: Decimal,
    available_cash: Decimal,
    daily_starting_capital: Decimal,
    positions: HashMap<String, Position>,
    trade_history: Vec<TradeRecord>,
    /// Latched by `check_daily_targets`; sticky for the session.
    halted: bool,

    max_position_fraction: Decimal,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
    daily_target_pct: Decimal,
    daily_max_loss_pct: Decimal,
    atr_stop_multiplier: Decimal,
    atr_take_multiplier: Decimal,
}

impl RiskLedger {
    /// # Errors
    ///
    /// Returns an error if a config fraction cannot be represented as a
    /// `Decimal`.
    pub fn new(config: &RiskConfig, initial_capital: Decimal) -> Result<Self> {
        Ok(Self {
            capital: initial_capital,
            available_cash: initial_capital,
            daily_starting_capital: initial_capital,
            positions: HashMap::new(),
            trade_history: Vec::new(),
            halted: false,
            max_position_fraction: Decimal::try_from(config.max_position_fraction)?,
            stop_loss_pct: Decimal::try_from(config.stop_loss_pct)?,
            take_profit_pct: Decimal::try_from(config.take_profit_pct)?,
            daily_target_pct: Decimal::try_from(config.daily_target_pct)?,
            daily_max_loss_pct: Decimal::try_from(config.daily_max_loss_pct)?,
            atr_stop_multiplier: Decimal::try_from(config.atr_stop_multiplier)?,
            atr_take_multiplier: Decimal::try_from(config.atr_take_multiplier)?,
        })
    }

    #[must_use]
    pub const fn capital(&self) -> Decimal {
        self.capital
    }

    #[must_use]
    pub const fn available_cash(&self) -> Decimal {
        self.available_cash
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// The open position for `symbol`, if any.
    #[must_use]
    pub fn open_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol).filter(|p| p.open)
    }

    #[must_use]
    pub fn open_symbols(&self) -> Vec<String> {
        self.positions
            .values()
            .filter(|p| p.open)
            .map(|p| p.symbol.clone())
            .collect()
    }

    #[must_use]
    pub fn trade_history(&self) -> &[TradeRecord] {
        &self.trade_history
    }

    /// Volatility-adjusted position sizing.
    ///
    /// With a volatility range available, the stop distance is
    /// `range × atr_stop_multiplier`; otherwise stop/target fall back to
    /// fixed fractions of the entry price. Quantity is the position budget
    /// (`capital × max_position_fraction`) divided by price, capped so the
    /// total at-stop loss stays within the budget. Returns `None` when the
    /// resulting quantity is below one share.
    #[must_use]
    pub fn compute_size(&self, price: Decimal, volatility: Option<Decimal>) -> Option<SizedOrder> {
        if price <= Decimal::ZERO {
            return None;
        }

        let budget = self.capital * self.max_position_fraction;

        let (stop_distance, take_distance) = match volatility {
            Some(range) if range > Decimal::ZERO => (
                range * self.atr_stop_multiplier,
                range * self.atr_take_multiplier,
            ),
            _ => (price * self.stop_loss_pct, price * self.take_profit_pct),
        };

        let mut quantity = (budget / price).floor().to_u64()?;
        if stop_distance > Decimal::ZERO {
            let risk_cap = (budget / stop_distance).floor().to_u64()?;
            quantity = quantity.min(risk_cap);
        }
        if quantity < 1 {
            return None;
        }

        Some(SizedOrder {
            quantity,
            stop_loss_price: price - stop_distance,
            take_profit_price: price + take_distance,
        })
    }

    /// Whether a new entry for `symbol` at `price` is currently allowed.
    /// Routine gate, not an error path.
    #[must_use]
    pub fn can_open(&self, symbol: &str, price: Decimal) -> bool {
        if self.halted {
            tracing::info!(symbol, "entry blocked: daily target/loss latch set");
            return false;
        }
        if self.open_position(symbol).is_some() {
            tracing::info!(symbol, "entry blocked: position already open");
            return false;
        }

        let max_per_position = self.capital * self.max_position_fraction;
        if price > max_per_position {
            tracing::warn!(
                symbol,
                %price,
                %max_per_position,
                "entry blocked: one share exceeds position budget"
            );
            return false;
        }

        if self.current_drawdown() >= self.daily_max_loss_pct {
            tracing::warn!(symbol, "entry blocked: daily loss limit reached");
            return false;
        }

        if price > self.available_cash {
            tracing::warn!(
                symbol,
                %price,
                available_cash = %self.available_cash,
                "entry blocked: insufficient cash"
            );
            return false;
        }

        true
    }

    /// Opens a position. Returns `Ok(false)` (logged, no-op) for routine
    /// rejections; `Err` only when an open position already exists, which
    /// means the caller skipped `can_open`.
    pub fn open(
        &mut self,
        symbol: &str,
        price: Decimal,
        sized: SizedOrder,
        entry_time: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        if self.open_position(symbol).is_some() {
            return Err(LedgerError::PositionOpen(symbol.to_string()));
        }
        if !self.can_open(symbol, price) {
            return Ok(false);
        }

        let cost = price * Decimal::from(sized.quantity);
        if cost > self.available_cash {
            tracing::warn!(
                symbol,
                %cost,
                available_cash = %self.available_cash,
                "entry rejected: sized cost exceeds available cash"
            );
            return Ok(false);
        }

        self.available_cash -= cost;
        self.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                entry_price: price,
                quantity: sized.quantity,
                stop_loss_price: sized.stop_loss_price,
                take_profit_price: sized.take_profit_price,
                entry_time,
                open: true,
            },
        );

        tracing::info!(
            symbol,
            entry = %price,
            quantity = sized.quantity,
            stop = %sized.stop_loss_price,
            take = %sized.take_profit_price,
            "position opened"
        );
        Ok(true)
    }

    /// Closes the open position for `symbol` at `exit_price` and returns
    /// the realized profit. `Ok(None)` when the symbol has no position
    /// (routine). Closing an already-closed position is an invariant
    /// violation: the P&L was already booked exactly once.
    pub fn close(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
    ) -> Result<Option<Decimal>, LedgerError> {
        let Some(pos) = self.positions.get_mut(symbol) else {
            tracing::info!(symbol, "close skipped: no position");
            return Ok(None);
        };
        if !pos.open {
            return Err(LedgerError::AlreadyClosed(symbol.to_string()));
        }

        let quantity = Decimal::from(pos.quantity);
        let profit = (exit_price - pos.entry_price) * quantity;
        pos.open = false;

        self.capital += profit;
        self.available_cash += exit_price * quantity;

        let record = TradeRecord {
            symbol: symbol.to_string(),
            entry_price: pos.entry_price,
            exit_price,
            quantity: pos.quantity,
            entry_time: pos.entry_time,
            exit_time,
            profit,
            capital_after: self.capital,
        };
        tracing::info!(
            symbol,
            exit = %exit_price,
            %profit,
            capital = %self.capital,
            "position closed"
        );
        self.trade_history.push(record);

        Ok(Some(profit))
    }

    /// True while trading may continue. Latches false once the session
    /// profit target is met or the drawdown limit is breached; the latch
    /// holds for the rest of the session even if capital recovers.
    pub fn check_daily_targets(&mut self) -> bool {
        if self.halted {
            return false;
        }

        let current_return =
            (self.capital - self.daily_starting_capital) / self.daily_starting_capital;
        if current_return >= self.daily_target_pct {
            tracing::info!(%current_return, "daily profit target met; halting new entries");
            self.halted = true;
            return false;
        }

        if self.current_drawdown() >= self.daily_max_loss_pct {
            tracing::warn!(drawdown = %self.current_drawdown(), "daily loss limit breached; halting new entries");
            self.halted = true;
            return false;
        }

        true
    }

    /// Closes every open position at the looked-up price (typically the
    /// latest bar close). Positions without a price are left open and
    /// logged; the caller decides whether that is fatal.
    pub fn liquidate_all<F>(&mut self, price_lookup: F) -> Vec<TradeRecord>
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        let mut closed = Vec::new();
        for symbol in self.open_symbols() {
            let Some(price) = price_lookup(&symbol) else {
                tracing::warn!(symbol, "liquidation skipped: no price available");
                continue;
            };
            // Only open positions are iterated, so close cannot report an
            // invariant violation here.
            match self.close(&symbol, price, Utc::now()) {
                Ok(Some(_)) => {
                    if let Some(record) = self.trade_history.last() {
                        closed.push(record.clone());
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::error!(symbol, error = %e, "liquidation failed"),
            }
        }
        closed
    }

    fn current_drawdown(&self) -> Decimal {
        (self.daily_starting_capital - self.capital) / self.daily_starting_capital
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use rust_decimal_macros::dec;

    fn ledger(initial: Decimal) -> RiskLedger {
        let config = RiskConfig {
            max_position_fraction: 0.5,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
            daily_target_pct: 0.02,
            daily_max_loss_pct: 0.03,
            atr_stop_multiplier: 2.0,
            atr_take_multiplier: 4.0,
        };
        RiskLedger::new(&config, initial).unwrap()
    }

    #[test]
    fn sizing_with_volatility_matches_budget_and_stop() {
        // capital 1000, fraction 0.5 => budget 500; ATR 2.5 * 2 => stop 95.
        let ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(100), Some(dec!(2.5))).unwrap();

        assert_eq!(sized.quantity, 5);
        assert_eq!(sized.stop_loss_price, dec!(95));
        assert_eq!(sized.take_profit_price, dec!(110));
    }

    #[test]
    fn sizing_caps_quantity_by_stop_risk() {
        // Wide stop: budget 500, stop distance 200 => at most 2 shares.
        let ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(10), Some(dec!(100))).unwrap();
        assert_eq!(sized.quantity, 2);
    }

    #[test]
    fn sizing_falls_back_to_fixed_percentages() {
        let ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(100), None).unwrap();

        assert_eq!(sized.stop_loss_price, dec!(98.00));
        assert_eq!(sized.take_profit_price, dec!(104.00));
        assert_eq!(sized.quantity, 5);
    }

    #[test]
    fn sizing_returns_none_below_one_share() {
        let ledger = ledger(dec!(100));
        // budget 50, price 60 => zero shares
        assert!(ledger.compute_size(dec!(60), None).is_none());
    }

    #[test]
    fn open_decrements_cash_by_notional() {
        let mut ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(100), Some(dec!(2.5))).unwrap();
        let opened = ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();

        assert!(opened);
        assert_eq!(ledger.available_cash(), dec!(500));
        assert_eq!(ledger.capital(), dec!(1000));
    }

    #[test]
    fn close_books_pnl_exactly_once() {
        let mut ledger = ledger(dec!(1000));
        let sized = SizedOrder {
            quantity: 3,
            stop_loss_price: dec!(95),
            take_profit_price: dec!(110),
        };
        ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();

        let profit = ledger.close("AAPL", dec!(102), Utc::now()).unwrap().unwrap();
        assert_eq!(profit, dec!(6));
        assert_eq!(ledger.capital(), dec!(1006));
        // 700 remaining + 306 proceeds
        assert_eq!(ledger.available_cash(), dec!(1006));
        assert_eq!(ledger.trade_history().len(), 1);
    }

    #[test]
    fn close_at_entry_price_is_flat() {
        let mut ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(100), None).unwrap();
        ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();

        let profit = ledger.close("AAPL", dec!(100), Utc::now()).unwrap().unwrap();
        assert_eq!(profit, Decimal::ZERO);
        assert_eq!(ledger.capital(), dec!(1000));
        assert_eq!(ledger.available_cash(), dec!(1000));
    }

    #[test]
    fn close_without_position_is_routine_none() {
        let mut ledger = ledger(dec!(1000));
        assert_eq!(ledger.close("AAPL", dec!(100), Utc::now()).unwrap(), None);
    }

    #[test]
    fn double_close_is_invariant_violation() {
        let mut ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(100), None).unwrap();
        ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();
        ledger.close("AAPL", dec!(101), Utc::now()).unwrap();

        assert_eq!(
            ledger.close("AAPL", dec!(101), Utc::now()),
            Err(LedgerError::AlreadyClosed("AAPL".to_string()))
        );
    }

    #[test]
    fn duplicate_open_is_invariant_violation() {
        let mut ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(100), None).unwrap();
        ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();

        assert_eq!(
            ledger.open("AAPL", dec!(100), sized, Utc::now()),
            Err(LedgerError::PositionOpen("AAPL".to_string()))
        );
    }

    #[test]
    fn reentry_after_close_is_allowed() {
        let mut ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(100), None).unwrap();
        ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();
        ledger.close("AAPL", dec!(100), Utc::now()).unwrap();

        let reopened = ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();
        assert!(reopened);
    }

    #[test]
    fn can_open_false_when_cash_below_one_share() {
        let config = RiskConfig {
            max_position_fraction: 0.9,
            ..RiskConfig::default()
        };
        let mut ledger = RiskLedger::new(&config, dec!(1000)).unwrap();
        let sized = ledger.compute_size(dec!(100), None).unwrap();
        // 9 shares at 100 leaves 100 in cash
        ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();

        assert_eq!(ledger.available_cash(), dec!(100));
        // 200 is within the 900 position budget but exceeds available cash
        assert!(!ledger.can_open("MSFT", dec!(200)));
    }

    #[test]
    fn daily_target_latch_is_sticky() {
        let mut ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(100), None).unwrap();
        ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();
        // +5% on 500 notional = +25 => 2.5% return, above the 2% target
        ledger.close("AAPL", dec!(105), Utc::now()).unwrap();

        assert!(!ledger.check_daily_targets());

        // Latch holds even though capital alone would pass every other gate.
        assert!(!ledger.can_open("AAPL", dec!(100)));
        let opened = ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();
        assert!(!opened);
        assert!(!ledger.check_daily_targets());
    }

    #[test]
    fn drawdown_breach_halts_new_entries() {
        let mut ledger = ledger(dec!(1000));
        let sized = ledger.compute_size(dec!(100), None).unwrap();
        ledger.open("AAPL", dec!(100), sized, Utc::now()).unwrap();
        // -8% on 500 notional = -40 => 4% drawdown, above the 3% limit
        ledger.close("AAPL", dec!(92), Utc::now()).unwrap();

        assert!(!ledger.check_daily_targets());
        assert!(!ledger.can_open("MSFT", dec!(10)));
    }

    #[test]
    fn liquidate_all_closes_open_positions() {
        let mut ledger = ledger(dec!(10000));
        let sized_a = ledger.compute_size(dec!(100), None).unwrap();
        ledger.open("AAPL", dec!(100), sized_a, Utc::now()).unwrap();
        let sized_b = ledger.compute_size(dec!(50), None).unwrap();
        ledger.open("MSFT", dec!(50), sized_b, Utc::now()).unwrap();

        let closed = ledger.liquidate_all(|symbol| match symbol {
            "AAPL" => Some(dec!(101)),
            "MSFT" => Some(dec!(49)),
            _ => None,
        });

        assert_eq!(closed.len(), 2);
        assert!(ledger.open_symbols().is_empty());
    }
}
