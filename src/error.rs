/// Everything that can go wrong while solving a turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolveError {
    /// A count outside [0,2], a vector of the wrong length, or a tile outside
    /// the alphabet. Rejected before any solving happens.
    #[error("invalid state vector: {0}")]
    InvalidStateVector(String),

    /// The static generation rules produced an illegal or oversized set.
    #[error("catalog build failed: {0}")]
    CatalogBuild(String),

    /// The engine found no feasible layout, or returned one that breaks the
    /// conservation/bound constraints. The current board is always feasible,
    /// so this is an internal consistency failure.
    #[error("solver infeasible: {0}")]
    SolverInfeasible(String),

    /// The engine ran past its wall-clock budget.
    #[error("solver exceeded its {limit_ms} ms time budget")]
    SolverTimeout { limit_ms: u64 },
}

impl SolveError {
    /// Only a timeout is worth retrying (with a larger budget).
    pub fn is_retryable(&self) -> bool {
        matches!(self, SolveError::SolverTimeout { .. })
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeout_is_retryable() {
        assert!(SolveError::SolverTimeout { limit_ms: 5 }.is_retryable());
        assert!(!SolveError::InvalidStateVector("x".into()).is_retryable());
        assert!(!SolveError::CatalogBuild("x".into()).is_retryable());
        assert!(!SolveError::SolverInfeasible("x".into()).is_retryable());
    }

    #[test]
    fn test_timeout_message_names_budget() {
        let err = SolveError::SolverTimeout { limit_ms: 250 };
        assert_eq!(err.to_string(), "solver exceeded its 250 ms time budget");
    }
}
