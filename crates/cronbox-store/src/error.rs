use thiserror::Error;

/// Errors from the task and execution stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No live task row with the given ID.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    /// No execution row with the given ID.
    #[error("Execution not found: {id}")]
    ExecutionNotFound { id: String },

    /// A stored row failed to parse back into its domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
