use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use intraday_core::events::{FeedEvent, Tick};
use intraday_core::traits::MarketFeed;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Seeded random-walk tick generator for paper trading. Emits one tick per
/// symbol per interval, round-robin, with timestamps advancing on a
/// synthetic clock. `pace` throttles emission in wall-clock time; leave it
/// `None` to replay as fast as the consumer can drain.
pub struct RandomWalkFeed {
    symbols: Vec<String>,
    rng: StdRng,
    prices: HashMap<String, f64>,
    clock: DateTime<Utc>,
    tick_interval: Duration,
    pace: Option<std::time::Duration>,
    remaining: u64,
    next_symbol: usize,
}

impl RandomWalkFeed {
    #[must_use]
    pub fn new(
        symbols: Vec<String>,
        seed: u64,
        start_price: f64,
        tick_interval_secs: u64,
        max_ticks: u64,
        pace: Option<std::time::Duration>,
    ) -> Self {
        let prices = symbols
            .iter()
            .map(|s| (s.clone(), start_price))
            .collect();
        Self {
            symbols,
            rng: StdRng::seed_from_u64(seed),
            prices,
            clock: Utc::now(),
            tick_interval: Duration::seconds(tick_interval_secs.max(1) as i64),
            pace,
            remaining: max_ticks,
            next_symbol: 0,
        }
    }
}

#[async_trait]
impl MarketFeed for RandomWalkFeed {
    async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        if self.remaining == 0 || self.symbols.is_empty() {
            return Ok(None);
        }
        self.remaining -= 1;

        if self.next_symbol == 0 {
            self.clock += self.tick_interval;
            if let Some(pace) = self.pace {
                tokio::time::sleep(pace).await;
            }
        }
        let symbol = self.symbols[self.next_symbol].clone();
        self.next_symbol = (self.next_symbol + 1) % self.symbols.len();

        let price = self
            .prices
            .get_mut(&symbol)
            .expect("every symbol is seeded at construction");
        let step: f64 = self.rng.gen_range(-0.002..0.002);
        *price = (*price * (1.0 + step)).max(0.01);

        let volume: i64 = self.rng.gen_range(1..10);
        Ok(Some(FeedEvent::Tick(Tick {
            symbol,
            timestamp: self.clock,
            price: Decimal::try_from(*price)?,
            volume: Decimal::from(volume),
        })))
    }
}
