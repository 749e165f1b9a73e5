//! Tick-to-bar aggregation.
//!
//! One aggregator instance owns every symbol's buffers; only the feed
//! consumer mutates it, so per-symbol sequences are single-writer. A
//! tick's window is its timestamp truncated to the bar duration; a tick
//! landing in a later window closes the previous one. Empty windows never
//! produce a bar.

use chrono::{DateTime, TimeZone, Utc};
use intraday_core::events::{Bar, Tick};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug)]
struct WindowAccumulator {
    open_time: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

impl WindowAccumulator {
    fn start(open_time: DateTime<Utc>, tick: &Tick) -> Self {
        Self {
            open_time,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.volume,
        }
    }

    fn update(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.volume += tick.volume;
    }

    fn into_bar(self, symbol: &str) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            open_time: self.open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

#[derive(Debug, Default)]
struct SymbolBook {
    window: Option<WindowAccumulator>,
    bars: Vec<Bar>,
    dropped_ticks: u64,
}

/// Converts a tick stream into closed, time-ordered OHLCV bars per symbol,
/// retaining a bounded history.
pub struct BarAggregator {
    bar_secs: i64,
    retention_bars: usize,
    books: HashMap<String, SymbolBook>,
}

impl BarAggregator {
    #[must_use]
    pub fn new(bar_secs: u64, retention_bars: usize) -> Self {
        Self {
            bar_secs: bar_secs.max(1) as i64,
            retention_bars: retention_bars.max(1),
            books: HashMap::new(),
        }
    }

    /// Consumes one tick. Returns the finalized bar when this tick opened a
    /// new window and thereby closed the previous one. Out-of-order ticks
    /// (earlier than the open window) are dropped and counted, never fatal.
    pub fn ingest(&mut self, tick: &Tick) -> Option<Bar> {
        let window_start = self.window_start(tick.timestamp);
        let retention = self.retention_bars;
        let book = self.books.entry(tick.symbol.clone()).or_default();

        let Some(current) = book.window.as_mut() else {
            // A fresh window must still land after the finalized history
            // (possible after `try_finalize` closed the previous window).
            if book.bars.last().is_some_and(|last| window_start <= last.open_time) {
                book.dropped_ticks += 1;
                tracing::debug!(
                    symbol = %tick.symbol,
                    tick_time = %tick.timestamp,
                    "dropped out-of-order tick"
                );
                return None;
            }
            book.window = Some(WindowAccumulator::start(window_start, tick));
            return None;
        };

        match window_start.cmp(&current.open_time) {
            std::cmp::Ordering::Equal => {
                current.update(tick);
                None
            }
            std::cmp::Ordering::Less => {
                let window = current.open_time;
                book.dropped_ticks += 1;
                tracing::debug!(
                    symbol = %tick.symbol,
                    tick_time = %tick.timestamp,
                    %window,
                    "dropped out-of-order tick"
                );
                None
            }
            std::cmp::Ordering::Greater => {
                let closed = book
                    .window
                    .replace(WindowAccumulator::start(window_start, tick))?
                    .into_bar(&tick.symbol);
                Self::push_bar(book, closed.clone(), retention);
                Some(closed)
            }
        }
    }

    /// Closes the open window for `symbol` if `now` has moved past it.
    /// Pull-driven counterpart to `ingest` for idle symbols and session end.
    pub fn try_finalize(&mut self, symbol: &str, now: DateTime<Utc>) -> Option<Bar> {
        let window_start = self.window_start(now);
        let retention = self.retention_bars;
        let book = self.books.get_mut(symbol)?;

        let ready = book
            .window
            .as_ref()
            .is_some_and(|acc| window_start > acc.open_time);
        if !ready {
            return None;
        }

        let closed = book.window.take()?.into_bar(symbol);
        Self::push_bar(book, closed.clone(), retention);
        Some(closed)
    }

    /// Appends a pre-formed bar (historical replay path). A bar that does
    /// not advance `open_time` is dropped under the same policy as a late
    /// tick. Returns whether the bar was appended.
    pub fn append_bar(&mut self, bar: Bar) -> bool {
        let retention = self.retention_bars;
        let book = self.books.entry(bar.symbol.clone()).or_default();

        if let Some(last) = book.bars.last() {
            if bar.open_time <= last.open_time {
                book.dropped_ticks += 1;
                tracing::debug!(
                    symbol = %bar.symbol,
                    open_time = %bar.open_time,
                    last = %last.open_time,
                    "dropped non-advancing bar"
                );
                return false;
            }
        }
        Self::push_bar(book, bar, retention);
        true
    }

    /// The finalized bar sequence for `symbol`, oldest first.
    #[must_use]
    pub fn bars(&self, symbol: &str) -> &[Bar] {
        self.books.get(symbol).map_or(&[], |b| b.bars.as_slice())
    }

    /// The freshest known price: the open window's last trade if one is
    /// buffered, otherwise the last finalized close.
    #[must_use]
    pub fn latest_price(&self, symbol: &str) -> Option<Decimal> {
        let book = self.books.get(symbol)?;
        book.window
            .as_ref()
            .map(|acc| acc.close)
            .or_else(|| book.bars.last().map(|b| b.close))
    }

    #[must_use]
    pub fn dropped_ticks(&self, symbol: &str) -> u64 {
        self.books.get(symbol).map_or(0, |b| b.dropped_ticks)
    }

    fn push_bar(book: &mut SymbolBook, bar: Bar, retention: usize) {
        debug_assert!(
            book.bars.last().map_or(true, |last| last.open_time < bar.open_time),
            "bar sequence must be strictly increasing"
        );
        book.bars.push(bar);
        if book.bars.len() > retention {
            let excess = book.bars.len() - retention;
            book.bars.drain(..excess);
        }
    }

    fn window_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let aligned = timestamp.timestamp().div_euclid(self.bar_secs) * self.bar_secs;
        Utc.timestamp_opt(aligned, 0).unwrap()
    }
}
