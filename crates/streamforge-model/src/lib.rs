//! Data model for the streamforge pipeline compiler.
//!
//! This crate owns the relationship graph and the plain data types that
//! the buffer graph, scheduler, segment compiler and runtime bookkeeping
//! in `streamforge-analysis`/`streamforge-compiler`/`streamforge-runtime`
//! build on top of.

pub mod add_graph;
pub mod buffer;
pub mod consumer;
pub mod error;
pub mod ids;
pub mod rate;
pub mod relationship;
pub mod termination;

pub use add_graph::AddGraph;
pub use buffer::{BufferNode, BufferRateData, BufferType};
pub use consumer::ConsumerNode;
pub use error::{ModelError, Result};
pub use ids::{BindingId, CalleeId, KernelId, PartitionId, ScalarId, StreamSetId};
pub use rate::{ceil_u_mul_rate, AttributeKind, Attributes, ProcessingRate, Rational};
pub use relationship::{
    BindingNode, BindingTarget, CalleeNode, EdgeReason, KernelNode, NodeRef, PortType,
    RelationshipGraph, RelationshipType, ScalarNode, StreamSetNode,
};
pub use termination::{TerminationGraph, TerminationSignal, Vertex as TerminationVertex};
