//! `signal_runtime`: tokio plumbing around `signal_core`. Event source and
//! display sink contracts, the pipeline actor, and config loading.

mod config;
mod pipeline;
pub mod sink;
pub mod source;

pub use config::{apply_overrides, load_config, parse_overrides, validate_config};
pub use pipeline::{PipelineError, PipelineSnapshot, TrafficLightPipeline};
pub use sink::{ChannelSink, DisplaySink, FnSink};
pub use source::{EventSource, LocalBroadcastSource, PayloadHandler, SourceError, SubscriptionHandle};
