//! `AddGraph`: cumulative `Add(k)` bookkeeping along a stream path, so
//! final item counts at closure respect declared extra-items. A
//! fixed-rate input whose producer declares `Add(k)` has `k` items
//! appended on closure.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::StreamSetId;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AddGraph {
    /// Cumulative extra items owed to each stream-set by the time it
    /// closes, accumulated as producers along its path declare `Add(k)`.
    cumulative: HashMap<StreamSetId, u64>,
}

impl AddGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_add(&mut self, stream_set: StreamSetId, k: u64) {
        *self.cumulative.entry(stream_set).or_insert(0) += k;
    }

    /// Propagates a downstream stream-set's cumulative add count forward
    /// from an upstream one it was derived from (e.g. a relative-rate
    /// output inherits its reference's outstanding add count).
    pub fn propagate(&mut self, from: StreamSetId, to: StreamSetId) {
        let v = self.cumulative.get(&from).copied().unwrap_or(0);
        *self.cumulative.entry(to).or_insert(0) += v;
    }

    pub fn cumulative_add(&self, stream_set: StreamSetId) -> u64 {
        self.cumulative.get(&stream_set).copied().unwrap_or(0)
    }
}
