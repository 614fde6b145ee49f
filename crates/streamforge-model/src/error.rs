use thiserror::Error;

use crate::ids::{BindingId, KernelId};

/// Configuration errors surfaced at compile time.
///
/// These are always fatal to compilation; none of them are recoverable
/// at runtime because they indicate the pipeline itself is ill-formed.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("kernel {0:?} already has a binding named {1:?}")]
    DuplicateBindingName(KernelId, String),

    #[error("reference edge from binding {0:?} crosses a partition boundary")]
    ReferenceEdgeCrossesPartition(BindingId),

    #[error("binding {0:?} is the target of more than one reference edge")]
    MultipleReferenceEdges(BindingId),

    #[error("cycle detected in relationship graph after ordering-edge insertion (kernel {0:?})")]
    OrderingCycle(KernelId),

    #[error("binding {0:?} has no connected stream-set or scalar")]
    DanglingBinding(BindingId),

    #[error("dataflow equations are infeasible for partition {0}")]
    DataflowInfeasible(u32),

    #[error("greedy rate is not permitted on an output binding ({0:?})")]
    GreedyOutputRejected(BindingId),

    #[error("scheduling search did not converge within the round budget: {0}")]
    ConvergenceTimeout(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
