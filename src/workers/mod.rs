// Background workers of the eviction engine.

pub mod evictor;

pub use evictor::Evictor;
