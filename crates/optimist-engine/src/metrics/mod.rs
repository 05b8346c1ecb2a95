//! Metrics module for the optimist engine.

pub mod engine;

pub use engine::{EngineMetrics, register_engine_metrics};
