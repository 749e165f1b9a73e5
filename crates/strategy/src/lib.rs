pub mod scorer;

pub use scorer::SignalScorer;
