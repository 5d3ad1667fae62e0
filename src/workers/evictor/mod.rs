pub mod counters;
pub mod evictor;
pub mod telemetry;
pub mod tune;

pub use counters::{Counters, CountersSnapshot};
pub use evictor::Evictor;
pub use tune::Tuner;
