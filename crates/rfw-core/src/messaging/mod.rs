//! Operator-facing messaging (command replies, progress reports).

pub mod port;
pub mod throttled;
pub mod types;
