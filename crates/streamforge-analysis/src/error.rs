use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Model(#[from] streamforge_model::ModelError),

    #[error("dataflow equations are infeasible for partition {0}")]
    Infeasible(u32),

    #[error("scheduling search for partition {0} did not converge within {1} rounds")]
    ConvergenceTimeout(u32, usize),

    #[error("greedy rate is not permitted on output binding {0:?}")]
    GreedyOutput(streamforge_model::BindingId),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
