//! Error taxonomy shared by every stage of the pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], stable across message changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Validation,
    FileNotFound,
    GeometryProcessing,
    MonitorNotFound,
    ResonanceNotFound,
    InvalidInput,
    Engine,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Persisted configuration exists but cannot be used
    #[error("invalid configuration file {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// A resolved parameter violates a job invariant
    #[error("invalid job parameter `{key}`: {reason}")]
    Validation { key: String, reason: String },

    #[error("{what} file not found: {path:?}")]
    FileNotFound { what: &'static str, path: PathBuf },

    #[error("cannot read {what} file {path:?}: {source}")]
    FileUnreadable {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("geometry processing failed for {path:?}: {source}")]
    GeometryProcessing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("monitor `{requested}` not found, available: [{}]", available.join(", "))]
    MonitorNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error("no resonance found: {0}")]
    ResonanceNotFound(String),

    /// Required keys absent from a job handed to a backend
    #[error("job is missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    #[error("invalid spectrum: {0}")]
    InvalidSpectrum(String),

    #[error("malformed result artifact {path:?}: {reason}")]
    MalformedArtifact { path: PathBuf, reason: String },

    #[error("engine failure: {0}")]
    Engine(String),

    #[error("driver template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::Config,
            Error::Validation { .. } | Error::MissingParameters(_) => ErrorKind::Validation,
            Error::FileNotFound { .. } | Error::FileUnreadable { .. } => ErrorKind::FileNotFound,
            Error::GeometryProcessing { .. } => ErrorKind::GeometryProcessing,
            Error::MonitorNotFound { .. } => ErrorKind::MonitorNotFound,
            Error::ResonanceNotFound(_) => ErrorKind::ResonanceNotFound,
            Error::InvalidSpectrum(_) | Error::MalformedArtifact { .. } => ErrorKind::InvalidInput,
            Error::Engine(_) | Error::Template(_) => ErrorKind::Engine,
            Error::Io(_) | Error::Json(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn validation(key: &str, reason: impl Into<String>) -> Self {
        Error::Validation {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_not_found_lists_available() {
        let err = Error::MonitorNotFound {
            requested: "o3 mode".to_string(),
            available: vec!["o1 mode".to_string(), "o2 mode".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("o3 mode"));
        assert!(msg.contains("o1 mode, o2 mode"));
        assert_eq!(err.kind(), ErrorKind::MonitorNotFound);
    }

    #[test]
    fn test_unreadable_is_file_not_found_kind() {
        let err = Error::FileUnreadable {
            what: "GDS",
            path: PathBuf::from("device.gds"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_missing_parameters_is_validation_kind() {
        let err = Error::MissingParameters(vec!["mode_num".into(), "task_name".into()]);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "job is missing required parameters: mode_num, task_name"
        );
    }
}
