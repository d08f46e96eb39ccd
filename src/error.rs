// Domain errors shared by the recorder, player directory and reports.

#[derive(Debug, thiserror::Error)]
pub enum LadderError {
    /// Caller-fixable input problem, reported verbatim.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Backing store failure. The detail is logged, never shown.
    #[error("storage failure")]
    Storage(#[from] sqlx::Error),
}

impl LadderError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LadderError::Validation(_) => "validation",
            LadderError::NotFound(_) => "not_found",
            LadderError::Conflict(_) => "conflict",
            LadderError::Storage(_) => "storage",
        }
    }
}
