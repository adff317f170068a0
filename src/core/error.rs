use crate::core::DbType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal native name '{0}': {1}")]
    IllegalName(String, String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Extended property '{0}' has stored values and cannot be deleted")]
    PropertyInUse(String),

    #[error("Cannot handle type {0} in the extended value table")]
    CannotHandle(DbType),

    #[error("Unsupported settings schema version {0}")]
    UnsupportedSchemaVersion(u32),

    #[error("Entity type '{0}' not found")]
    EntityTypeNotFound(String),

    #[error("Field '{0}' not found on entity type '{1}'")]
    FieldNotFound(String, String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
