//! The kernel segment compiler: state machine emission, I/O item-count
//! calculation, and consumer/termination bookkeeping wiring.

pub mod consumer_wiring;
pub mod error;
pub mod io_calc;
pub mod ir;
pub mod segment;

pub use consumer_wiring::{build_consumer_graph, build_termination_graph, ConsumerGraph, DeadlockWatch};
pub use error::{CompilerError, Result};
pub use io_calc::{
    accessible_input_items, final_item_count, num_accessible_strides_fixed, num_accessible_strides_partial_sum,
    writable_output_items, FinalCountInputs, INFINITE,
};
pub use ir::{Buffer, IrBuilder, KernelDescriptor};
pub use segment::{compile_kernel_segment, KernelSegmentBlocks, KernelSegmentDescriptor, PortDescriptor};
