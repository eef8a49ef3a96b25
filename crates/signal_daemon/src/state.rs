use signal_core::PipelineConfig;
use signal_runtime::{ChannelSink, LocalBroadcastSource, TrafficLightPipeline};
use std::sync::Arc;

/// Capacity of the display update broadcast feeding SSE clients.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TrafficLightPipeline>,
    pub source: Arc<LocalBroadcastSource>,
    pub sink: Arc<ChannelSink>,
}

impl AppState {
    pub fn new(config: PipelineConfig) -> Self {
        let source = Arc::new(LocalBroadcastSource::new());
        let sink = Arc::new(ChannelSink::new(UPDATE_CHANNEL_CAPACITY));
        let pipeline = Arc::new(TrafficLightPipeline::new(
            config,
            source.clone(),
            sink.clone(),
        ));
        Self {
            pipeline,
            source,
            sink,
        }
    }
}
