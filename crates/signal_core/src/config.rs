use serde::{Deserialize, Serialize};

/// Broadcast channel the navigation app publishes on.
pub const DEFAULT_CHANNEL: &str = "AUTONAVI_STANDARD_BROADCAST_SEND";
/// `KEY_TYPE` value identifying a traffic-light payload.
pub const TRAFFIC_LIGHT_TYPE_TAG: i64 = 60073;

/// Tunables for one pipeline instance. Every field has a default so a
/// partial JSON file (or `{}`) is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub channel: String,
    pub signal_type_tag: i64,
    pub heartbeat_interval_ms: u64,
    pub expire_window_ms: u64,
    /// Added to a positive countdown when arming the auto-clear.
    pub auto_clear_padding_secs: u64,
    /// Auto-clear delay used when the countdown is zero.
    pub auto_clear_fallback_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            signal_type_tag: TRAFFIC_LIGHT_TYPE_TAG,
            heartbeat_interval_ms: 1_000,
            expire_window_ms: 10_000,
            auto_clear_padding_secs: 5,
            auto_clear_fallback_secs: 15,
        }
    }
}

impl PipelineConfig {
    /// Delay until the auto-clear fires for a signal with `countdown` seconds left.
    pub fn auto_clear_delay_ms(&self, countdown: u32) -> u64 {
        let secs = if countdown > 0 {
            u64::from(countdown).saturating_add(self.auto_clear_padding_secs)
        } else {
            self.auto_clear_fallback_secs
        };
        secs.saturating_mul(1_000)
    }
}
