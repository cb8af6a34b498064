//! Assortment-gap recommendation engine.
//!
//! Finds merchandise features a store's peer group sells well but the
//! store does not, sizes a restock, and filters the candidates down to
//! approved, profitable recommendations with one summary row per store.

pub mod adoption;
pub mod aggregator;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod event;
pub mod opportunity;
pub mod profitability;
pub mod rejection;
pub mod sell_through;
pub mod stats;
pub mod store;
pub mod synthetic;
pub mod types;
pub mod validation;

pub use config::{Granularity, PipelineConfig};
pub use dataset::Dataset;
pub use engine::{GapPipeline, RunOutput, RunReport};
pub use error::{PipelineError, PipelineResult};
