use serde::Serialize;
use thiserror::Error;

pub type FormulaResult<T> = Result<T, FormulaError>;

pub type CalcResult<T> = Result<T, CalcError>;

/// Failures raised while checking or evaluating a formula.
///
/// Every variant is recoverable: callers receive it as a value and the
/// evaluation never yields a partial result alongside it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("Missing field: '{0}' is not present in the record")]
    MissingField(String),

    #[error("Invalid date in field '{field}': {raw:?} cannot be parsed as a date")]
    InvalidDate { field: String, raw: String },

    #[error("Circular reference detected: {0}")]
    CircularReference(String),

    #[error("Evaluation error: {0}")]
    Runtime(String),
}

impl FormulaError {
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        FormulaError::Syntax {
            message: message.into(),
            position,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        FormulaError::Runtime(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FormulaError::Syntax { .. } => ErrorKind::SyntaxError,
            FormulaError::MissingField(_) => ErrorKind::MissingFieldError,
            FormulaError::InvalidDate { .. } => ErrorKind::InvalidDateError,
            FormulaError::CircularReference(_) => ErrorKind::CircularReferenceError,
            FormulaError::Runtime(_) => ErrorKind::EvaluationRuntimeError,
        }
    }
}

/// Error category reported to callers alongside the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    SyntaxError,
    MissingFieldError,
    InvalidDateError,
    CircularReferenceError,
    EvaluationRuntimeError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::MissingFieldError => "MissingFieldError",
            ErrorKind::InvalidDateError => "InvalidDateError",
            ErrorKind::CircularReferenceError => "CircularReferenceError",
            ErrorKind::EvaluationRuntimeError => "EvaluationRuntimeError",
        };
        f.write_str(name)
    }
}

/// Errors from the surfaces around the engine (files, config, CLI)
#[derive(Error, Debug)]
pub enum CalcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error("Validation error: {0}")]
    Validation(String),
}
