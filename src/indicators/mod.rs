// Streaming technical indicators
// Each indicator keeps its own rolling window and is fed one close at a time

pub mod rsi;
pub mod sma;

pub use rsi::RelativeStrength;
pub use sma::SimpleMovingAverage;
