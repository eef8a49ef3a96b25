//! Payload field extraction.
//!
//! The navigation broadcast is loosely typed: the same field arrives as an
//! integer, a float or a string depending on the sender version. Every
//! extraction falls back to a caller-supplied default instead of failing.

use crate::{Payload, RawSignal};

/// Wire field names. These must match the sender exactly.
pub mod fields {
    pub const TYPE_TAG: &str = "KEY_TYPE";
    pub const STATUS: &str = "trafficLightStatus";
    pub const RED_COUNTDOWN: &str = "redLightCountDownSeconds";
    pub const GREEN_LAST: &str = "greenLightLastSecond";
    pub const DIRECTION: &str = "dir";
    pub const WAIT_ROUND: &str = "waitRound";
}

/// Status value substituted when the field is missing; maps to no signal.
const MISSING_STATUS: i64 = i64::MIN;

/// Reads `key` as an integer, returning `default` when the key is missing
/// or the value cannot be coerced.
#[allow(clippy::cast_possible_truncation)] // float → int truncates toward zero by contract
pub fn get_int(payload: &Payload, key: &str, default: i64) -> i64 {
    let Some(value) = payload.get(key) else {
        return default;
    };
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if n.is_f64() {
                n.as_f64().map_or(default, |f| f.trunc() as i64)
            } else {
                // u64 above i64::MAX
                default
            }
        }
        serde_json::Value::String(s) => s.parse::<i64>().unwrap_or(default),
        _ => default,
    }
}

/// Returns the raw traffic-light fields, or `None` when the payload carries
/// a different (or no) type tag.
pub fn decode_payload(payload: &Payload, expected_type_tag: i64) -> Option<RawSignal> {
    if !payload.contains_key(fields::TYPE_TAG) {
        return None;
    }
    let type_tag = get_int(payload, fields::TYPE_TAG, 0);
    if type_tag != expected_type_tag {
        return None;
    }
    Some(RawSignal {
        status: get_int(payload, fields::STATUS, MISSING_STATUS),
        red_countdown: get_int(payload, fields::RED_COUNTDOWN, 0),
        direction: get_int(payload, fields::DIRECTION, 0),
        wait_round: get_int(payload, fields::WAIT_ROUND, 0),
        green_last: get_int(payload, fields::GREEN_LAST, 0),
    })
}
