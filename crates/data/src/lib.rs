pub mod aggregator;
pub mod replay;
pub mod sim;

pub use aggregator::BarAggregator;
pub use replay::{CsvReplayFeed, VecFeed};
pub use sim::RandomWalkFeed;
