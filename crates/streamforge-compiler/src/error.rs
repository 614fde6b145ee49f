use thiserror::Error;
use streamforge_model::{BindingId, KernelId};

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error(transparent)]
    Model(#[from] streamforge_model::ModelError),

    #[error(transparent)]
    Analysis(#[from] streamforge_analysis::AnalysisError),

    #[error("assertion failed in kernel {0:?}: {1}")]
    AssertionFailed(KernelId, String),

    #[error("kernel {0:?} was signaled terminated twice in the same run")]
    DoubleTermination(KernelId),

    #[error("item count for binding {0:?} overflowed 64 bits")]
    ItemCountOverflow(BindingId),

    #[error("buffer for stream-set feeding binding {0:?} has a null base address")]
    NullBaseAddress(BindingId),

    #[error("partial-sum reference stream for binding {0:?} is not monotonically non-decreasing")]
    NonMonotonicPartialSum(BindingId),
}

pub type Result<T> = std::result::Result<T, CompilerError>;
