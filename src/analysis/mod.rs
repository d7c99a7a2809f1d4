//! Pattern detection on candle series and live prices
//!
//! Everything here is synchronous; the only state lives in
//! [`DriftDetector`] and is owned by the caller.

pub mod drift;
pub mod pattern;
pub mod streak;


pub use drift::DriftDetector;
pub use pattern::{PumpDumpAnalyzer, PumpDumpCandidate};
pub use streak::StreakDetector;

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}
