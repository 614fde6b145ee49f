use streamforge_model::KernelId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Model(#[from] streamforge_model::ModelError),

    #[error(transparent)]
    Analysis(#[from] streamforge_analysis::AnalysisError),

    #[error(transparent)]
    Compiler(#[from] streamforge_compiler::CompilerError),

    #[error("object cache I/O error: {0}")]
    ObjectCache(String),

    #[error("pipeline stalled for two consecutive segments with kernel {0:?} unterminated")]
    Deadlock(KernelId),

    #[error("kernel {0:?} reported a fatal termination signal")]
    FatalTermination(KernelId),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
