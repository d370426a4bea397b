//! Flow Configuration
//!
//! Knobs that apply to a whole flow lineage. They are fixed when the flow is
//! built and carried unchanged through every `setting` call.

use serde::{Deserialize, Serialize};

/// Settings applied to every flow built from a [`FlowBuilder`](crate::FlowBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Deduplicate concurrent first-time computation of the same cache key.
    ///
    /// When enabled, threads that ask for a value another thread is already
    /// computing block until it finishes, so each derivation function runs at
    /// most once per key. When disabled, concurrent callers may compute the
    /// same key in parallel and the last one to finish wins the cache slot.
    pub single_flight: bool,

    /// Whether entities are memoized unless declared otherwise.
    pub memoize_by_default: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            single_flight: true,
            memoize_by_default: true,
        }
    }
}

impl FlowConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
