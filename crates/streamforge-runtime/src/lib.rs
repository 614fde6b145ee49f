//! Threading and synchronization drivers, pipeline configuration, the
//! object cache, and the `compile_pipeline` entry point that wires the
//! relationship graph through the scheduler and segment compiler to a
//! runnable pipeline.

pub mod compile;
pub mod config;
pub mod driver;
pub mod error;
pub mod kernel_runtime;
pub mod lsn;
pub mod object_cache;
pub mod termination_code;

pub use compile::{cache_key, compile_pipeline, CompiledPipeline};
pub use config::{Cli, Config, OptLevel, ThreadingMode};
pub use driver::PipelineDriver;
pub use error::{Result, RuntimeError};
pub use kernel_runtime::{KernelRuntime, SegmentOutcome};
pub use lsn::{KernelLsn, SegmentCounter};
pub use object_cache::{FileObjectCache, InMemoryObjectCache, ObjectCache};
pub use termination_code::TerminationCode;
