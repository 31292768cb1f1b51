use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManagerConfig {
    /// Cap on the number of outbound packets buffered while their route
    /// lookup is in flight. One packet per peer; overflow drops the new
    /// packet after an eviction sweep.
    pub max_buffered_messages: usize,
    /// Halflife for time-decayed path metrics. Reserved; no current code
    /// path reads it.
    pub metric_halflife_milliseconds: u32,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            max_buffered_messages: 30,
            metric_halflife_milliseconds: 180_000,
        }
    }
}
