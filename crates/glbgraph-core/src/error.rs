//! Error handling for graph loading.
//!
//! Every fallible operation in the workspace returns [`Result`]. The variants
//! follow the failure classes of the load pipeline: malformed input is a
//! [`GraphError::Format`], features the loader cannot express are
//! [`GraphError::Unsupported`], and failures of collaborators (buffer, image
//! or decompression sources) are [`GraphError::ExternalResource`].

use std::io;

use thiserror::Error;

/// Errors that can occur while loading a resource graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid format: {0}")]
    Format(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    #[error("External resource failure: {0}")]
    ExternalResource(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl GraphError {
    /// Creates a format error.
    pub fn format(message: impl Into<String>) -> Self {
        GraphError::Format(message.into())
    }

    /// Creates an unsupported feature error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        GraphError::Unsupported(message.into())
    }

    /// Creates an external resource error.
    pub fn external(message: impl Into<String>) -> Self {
        GraphError::ExternalResource(message.into())
    }

    /// Returns true for errors caused by malformed input.
    pub fn is_format(&self) -> bool {
        matches!(self, GraphError::Format(_) | GraphError::Json(_))
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_count_as_format() {
        let err: GraphError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.is_format());
        assert!(GraphError::format("bad").is_format());
        assert!(!GraphError::unsupported("x").is_format());
    }

    #[test]
    fn test_display() {
        let err = GraphError::external("buffer 3 unreachable");
        assert_eq!(err.to_string(), "External resource failure: buffer 3 unreachable");
    }
}
