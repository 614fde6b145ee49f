//! Consumer bookkeeping data model.

use serde::{Deserialize, Serialize};

use crate::ids::{KernelId, StreamSetId};

/// Tracks, for one stream-set, how far every consumer has read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerNode {
    pub stream_set: StreamSetId,
    pub consumers: Vec<KernelId>,
    /// Per-consumer processed count observed this segment (index-aligned
    /// with `consumers`); `None` until that consumer reports in.
    pub processed: Vec<Option<u64>>,
    /// Minimum of `processed` once every consumer has reported; this is
    /// the published `consumed_count` for the stream-set.
    pub consumed_count: u64,
    /// Count of consumers that have observed-in this segment.
    pub observed_this_segment: usize,
    /// Optional per-consumer individual consumed-count tracking, for
    /// dynamic-buffer diagnostics.
    pub track_individual: bool,
}

impl ConsumerNode {
    pub fn new(stream_set: StreamSetId, consumers: Vec<KernelId>) -> Self {
        let n = consumers.len();
        Self {
            stream_set,
            consumers,
            processed: vec![None; n],
            consumed_count: 0,
            observed_this_segment: 0,
            track_individual: false,
        }
    }

    /// Records consumer `idx`'s processed count for this segment. Once
    /// every consumer has reported, recomputes `consumed_count` as the
    /// minimum observed processed count — the final consumed count for
    /// this segment, and (if this was the last consumer) eligible to
    /// trigger a thread-local buffer release.
    pub fn report(&mut self, idx: usize, processed: u64) -> bool {
        if self.processed[idx].is_none() {
            self.observed_this_segment += 1;
        }
        self.processed[idx] = Some(processed);
        let all_reported = self.observed_this_segment == self.consumers.len();
        if all_reported {
            self.consumed_count = self.processed.iter().filter_map(|p| *p).min().unwrap_or(0);
        }
        all_reported
    }

    pub fn start_segment(&mut self) {
        self.observed_this_segment = 0;
        for p in &mut self.processed {
            *p = None;
        }
    }

    pub fn is_final_consumer(&self, idx: usize) -> bool {
        self.observed_this_segment == self.consumers.len() && idx == self.consumers.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{KernelId, StreamSetId};

    #[test]
    fn consumed_count_is_minimum_across_consumers() {
        let mut c = ConsumerNode::new(StreamSetId(0), vec![KernelId(0), KernelId(1)]);
        assert!(!c.report(0, 100));
        assert!(c.report(1, 40));
        assert_eq!(c.consumed_count, 40);
    }
}
