use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intraday_core::events::{Bar, FeedEvent, Tick};
use intraday_core::traits::MarketFeed;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Historical replay from CSV, sorted by timestamp on load.
pub struct CsvReplayFeed {
    events: Vec<FeedEvent>,
    current_index: usize,
}

impl CsvReplayFeed {
    /// Loads a tick CSV with columns `timestamp,symbol,price,volume`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, a row is malformed,
    /// or a timestamp/decimal fails to parse.
    pub fn from_tick_csv(path: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut events = Vec::new();

        for result in reader.records() {
            let record = result?;
            let timestamp: DateTime<Utc> = record[0].parse()?;
            events.push(FeedEvent::Tick(Tick {
                symbol: record[1].to_string(),
                timestamp,
                price: Decimal::from_str(&record[2])?,
                volume: Decimal::from_str(&record[3])?,
            }));
        }

        Ok(Self::sorted(events))
    }

    /// Loads a bar CSV with columns
    /// `timestamp,symbol,open,high,low,close,volume`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, a row is malformed,
    /// or a timestamp/decimal fails to parse.
    pub fn from_bar_csv(path: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut events = Vec::new();

        for result in reader.records() {
            let record = result?;
            let timestamp: DateTime<Utc> = record[0].parse()?;
            events.push(FeedEvent::Bar(Bar {
                symbol: record[1].to_string(),
                open_time: timestamp,
                open: Decimal::from_str(&record[2])?,
                high: Decimal::from_str(&record[3])?,
                low: Decimal::from_str(&record[4])?,
                close: Decimal::from_str(&record[5])?,
                volume: Decimal::from_str(&record[6])?,
            }));
        }

        Ok(Self::sorted(events))
    }

    fn sorted(mut events: Vec<FeedEvent>) -> Self {
        events.sort_by_key(FeedEvent::timestamp);
        Self {
            events,
            current_index: 0,
        }
    }
}

#[async_trait]
impl MarketFeed for CsvReplayFeed {
    async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        if self.current_index < self.events.len() {
            let event = self.events[self.current_index].clone();
            self.current_index += 1;
            Ok(Some(event))
        } else {
            Ok(None)
        }
    }
}

/// In-memory feed over a prepared event vector. Used by tests and anywhere
/// a feed is assembled programmatically.
pub struct VecFeed {
    events: std::vec::IntoIter<FeedEvent>,
}

impl VecFeed {
    #[must_use]
    pub fn new(events: Vec<FeedEvent>) -> Self {
        Self {
            events: events.into_iter(),
        }
    }
}

#[async_trait]
impl MarketFeed for VecFeed {
    async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        Ok(self.events.next())
    }
}
