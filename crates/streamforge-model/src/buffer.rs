//! Buffer-graph data model, built out fully in
//! `streamforge-analysis::buffer_graph`.

use serde::{Deserialize, Serialize};

use crate::ids::{KernelId, StreamSetId};
use crate::rate::Rational;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferType {
    Internal,
    Managed,
    External,
    ThreadLocal,
}

/// One vertex of the buffer graph, per stream-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferNode {
    pub stream_set: StreamSetId,
    pub lower_flow: Rational,
    pub upper_flow: Rational,
    pub look_behind: u64,
    pub copy_back: u64,
    pub look_ahead: u64,
    pub buffer_type: BufferType,
    /// Symbolic-rate equivalence class (identifySymbolicRates).
    pub symbolic_rate_class: Option<u32>,
}

impl BufferNode {
    pub fn new(stream_set: StreamSetId) -> Self {
        Self {
            stream_set,
            lower_flow: Rational::new(0, 1),
            upper_flow: Rational::new(0, 1),
            look_behind: 0,
            copy_back: 0,
            look_ahead: 0,
            buffer_type: BufferType::Internal,
            symbolic_rate_class: None,
        }
    }

    /// Overflow region required at the tail of the circular buffer:
    /// always at least the maximum look-ahead among consumers.
    pub fn overflow_region(&self) -> u64 {
        self.look_ahead.max(self.copy_back)
    }
}

/// One edge of the buffer graph (producer/consumer side of a port).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BufferRateData {
    pub kernel: KernelId,
    pub stream_set: StreamSetId,
    pub min_rate: Rational,
    pub max_rate: Rational,
    pub min_expected_flow: Rational,
    pub max_expected_flow: Rational,
    pub min_space_per_segment: Rational,
    pub max_space_per_segment: Rational,
}
