pub mod indicators;

pub use indicators::{compute, IndicatorRow};
