//! The scheduling analyzer: buffer graph derivation and the
//! partitioning/ordering search.

pub mod buffer_graph;
pub mod dawg;
pub mod engine;
pub mod error;
pub mod interpartition;
pub mod ordering;
pub mod partition;
pub mod repetition;
pub mod schedule;

pub use buffer_graph::{build_buffer_graph, compute_data_flow, identify_thread_local_buffers, resolve_copy_back_and_look_ahead, BufferGraph};
pub use dawg::{Dawg, TrieBuilder};
pub use engine::{AntColonyEngine, EvolutionaryEngine, Phenotype};
pub use error::{AnalysisError, Result};
pub use interpartition::{build_partition_graph, kendall_tau_distance, search_partition_order, PartitionGraph};
pub use ordering::{build_dependency_graph, memory_score, search_ordering, DependencyGraph, OrderingCandidate};
pub use partition::partition_kernels;
pub use repetition::compute_repetition;
pub use schedule::{schedule, ScheduleParams, ScheduleResult};
