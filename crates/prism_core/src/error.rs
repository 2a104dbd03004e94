use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the pipeline can report.
#[derive(Error, Debug)]
pub enum Error {
    /// A required input was missing or structurally unusable.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Malformed scene description or profile document.
    #[error("Parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Settings violate their stated bounds.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A pass could not produce a valid result.
    #[error("Optimization failed: {message}")]
    OptimizationFailure { message: String },

    #[error("Unsupported scene format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn parse<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_configuration<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn optimization_failure<S: Into<String>>(message: S) -> Self {
        Self::OptimizationFailure {
            message: message.into(),
        }
    }

    pub fn unsupported_format<S: Into<String>>(extension: S) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
        }
    }

    /// Failures scoped to a single scene. A batch logs these and moves on;
    /// anything else (bad settings, exhausted memory or disk) stops it.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidConfiguration { .. } => false,
            Self::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::OutOfMemory | std::io::ErrorKind::StorageFull
            ),
            _ => true,
        }
    }
}
