use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read state file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("state file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize panels: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write state file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("invalid panel name '{0}': expected 1-64 characters of [A-Za-z0-9._-]")]
    InvalidName(String),
    #[error("panel '{0}' not found")]
    NotFound(String),
    #[error("panel '{0}' already exists")]
    Conflict(String),
    #[error("cannot delete '{0}': it is the last panel")]
    LastPanel(String),
    #[error("path '{}' escapes project root {}", .path.display(), .root.display())]
    OutOfBounds { path: PathBuf, root: PathBuf },
    #[error("i/o error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistError),
}

impl CanvasError {
    /// Stable machine-readable tag, used in logs and HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CanvasError::InvalidName(_) => "invalid_name",
            CanvasError::NotFound(_) => "not_found",
            CanvasError::Conflict(_) => "conflict",
            CanvasError::LastPanel(_) => "last_panel",
            CanvasError::OutOfBounds { .. } => "out_of_bounds",
            CanvasError::Io { .. } => "io_error",
            CanvasError::Persistence(_) => "persistence_error",
        }
    }

    /// OS error kind for `Io` failures, so callers can tell a missing file
    /// from a permission problem.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            CanvasError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kind_is_only_reported_for_io_errors() {
        let missing = CanvasError::Io {
            path: PathBuf::from("/tmp/missing.html"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(missing.io_kind(), Some(io::ErrorKind::NotFound));
        assert_eq!(missing.code(), "io_error");

        let escape = CanvasError::OutOfBounds {
            path: PathBuf::from("../x"),
            root: PathBuf::from("/tmp/root"),
        };
        assert_eq!(escape.io_kind(), None);
        assert_eq!(escape.code(), "out_of_bounds");
    }

    #[test]
    fn persist_errors_convert_into_persistence_kind() {
        let inner = PersistError::Write {
            path: PathBuf::from("/tmp/state.json"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let err: CanvasError = inner.into();
        assert_eq!(err.code(), "persistence_error");
        assert!(err.to_string().contains("/tmp/state.json"));
    }
}
