//! `signal_core`: traffic-light decode, normalize and expire.
//!
//! No IO, no clock, no async. Time is passed in as milliseconds since
//! pipeline start; the runtime owns the timers.

mod config;
pub mod decoder;
mod freshness;
pub mod normalize;
mod pipeline;
mod types;

pub use config::{PipelineConfig, DEFAULT_CHANNEL, TRAFFIC_LIGHT_TYPE_TAG};
pub use decoder::{decode_payload, get_int};
pub use freshness::FreshnessEngine;
pub use normalize::{Normalized, Normalizer};
pub use pipeline::{Ingest, SignalPipeline};
pub use types::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;
