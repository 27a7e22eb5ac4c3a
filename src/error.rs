use thiserror::Error;

/// Failures raised by a sheet store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sheet '{sheet}' is empty or has no header row")]
    EmptyStore { sheet: String },

    #[error("sheet store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("live header does not match the expected layout: {}", mismatched.join("; "))]
    Incompatible { mismatched: Vec<String> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rejections of a submitted evaluation or of the profile it targets.
#[derive(Debug, Error, PartialEq)]
pub enum EvaluationError {
    #[error("factor score {score} is outside 1..=4")]
    FactorOutOfRange { score: u8 },

    #[error("expected {expected} factor scores, got {actual}")]
    FactorCount { expected: usize, actual: usize },

    #[error("expected {expected} goal actuals, got {actual}")]
    GoalCount { expected: usize, actual: usize },

    #[error("goal {goal} actual value {value} is not a finite, non-negative number")]
    InvalidActual { goal: usize, value: f64 },

    #[error("column '{column}' holds a non-numeric value '{value}'")]
    InvalidNumber { column: String, value: String },

    #[error("no employee named '{name}'")]
    EmployeeNotFound { name: String },
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch writer is closed")]
    Closed,
}
