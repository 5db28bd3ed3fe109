use thiserror::Error;

/// Fatal failures of a setup attempt
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found in store: {0}")]
    DataNotFound(String),
    #[error("no assignment satisfies the constraints: {0}")]
    InfeasibleProgram(String),
    #[error("solver failed: {0}")]
    Solver(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Failures of the strength estimator; callers fall back to prior means
#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("no historical games to fit")]
    NoData,
    #[error("MAP fit did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },
    #[error("posterior curvature is not positive definite")]
    Singular,
}

pub type Result<T> = std::result::Result<T, EngineError>;
