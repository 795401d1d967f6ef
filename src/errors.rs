use thiserror::Error;

use crate::restore::results::GranuleResult;

/// Errors surfaced to the caller of a restore invocation.
#[derive(Error, Debug)]
pub enum RestoreRequestError {
    #[error("request: {invocation} does not contain a config value for {key}")]
    Configuration { invocation: String, key: &'static str },

    #[error("request_files can only accept 1 granule in the list. This input contains {count}")]
    Cardinality { count: usize },

    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    #[error(transparent)]
    ParameterResolution(#[from] ParameterResolutionError),

    #[error(transparent)]
    Ledger(#[from] DbError),

    // Carries the complete per-file outcome set, successes included.
    #[error("One or more files failed to be requested. {result}")]
    Aggregate { result: GranuleResult },
}

/// A connection parameter could not be read from its configured source.
#[derive(Error, Debug)]
pub enum ParameterResolutionError {
    #[error("Environment variable {name} for {field} is not set")]
    MissingEnv { field: String, name: String },

    #[error("Parameter store lookup of {name} for {field} failed: {message}")]
    Store {
        field: String,
        name: String,
        message: String,
    },

    #[error("Connection parameter {0} has no configured source")]
    Unconfigured(&'static str),

    #[error("Invalid connection parameter spec: {0}")]
    InvalidSpec(#[from] serde_json::Error),
}

/// Any connectivity or driver failure talking to the request ledger.
///
/// The driver's message is kept verbatim; its native error type is not exposed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Database Error. {0}")]
pub struct DbError(pub String);

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        DbError(message.into())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError(err.to_string())
    }
}

/// A classified failure from the archival storage service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("An error occurred ({code}) when calling the {operation} operation: {message}")]
pub struct StorageError {
    pub code: String,
    pub operation: String,
    pub message: String,
}

/// Codes that will not change outcome on a retry.
const TERMINAL_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidObjectState",
    "InvalidArgument",
    "ObjectAlreadyInActiveTierError",
];

impl StorageError {
    pub fn new(
        code: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StorageError {
            code: code.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.code.as_str(), "NotFound" | "404")
    }

    pub fn is_retriable(&self) -> bool {
        !TERMINAL_CODES.contains(&self.code.as_str())
    }
}
