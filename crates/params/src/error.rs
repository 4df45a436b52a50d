//! Parameter store errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Missing parameter: {key}")]
    Missing { key: String },

    #[error("Parameter {key} has the wrong type, expected {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
