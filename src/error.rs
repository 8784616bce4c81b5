use std::path::PathBuf;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the library.
///
/// Only [`Error::Fetch`] is fatal to a repository analysis. Every other
/// variant is recovered where it happens and only shows up in the logs.
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    Fetch {
        url: String,
        branch: String,
        message: String,
    },
    Parse { file: PathBuf, message: String },
    CommentBlock { index: usize, message: String },
    Enrichment(String),
    Config(String),
    InvalidArgument(String),
    SerializationError(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "IO error: {}", e),
            Error::Fetch {
                url,
                branch,
                message,
            } => write!(f, "failed to clone {} ({}): {}", url, branch, message),
            Error::Parse { file, message } => {
                write!(f, "parse error in {}: {}", file.display(), message)
            }
            Error::CommentBlock { index, message } => {
                write!(f, "documentation block #{} is malformed: {}", index, message)
            }
            Error::Enrichment(msg) => write!(f, "enrichment failed: {}", msg),
            Error::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::SerializationError(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Short machine-readable tag used in failed analysis results.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::IoError(_) => "io_error",
            Error::Fetch { .. } => "fetch_failure",
            Error::Parse { .. } => "parse_failure",
            Error::CommentBlock { .. } => "comment_block_failure",
            Error::Enrichment(_) => "enrichment_failure",
            Error::Config(_) => "config_error",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::SerializationError(_) => "serialization_error",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(format!("JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(format!("YAML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = Error::Fetch {
            url: "https://example.com/a.git".to_string(),
            branch: "main".to_string(),
            message: "repository not found".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("https://example.com/a.git"));
        assert!(text.contains("main"));
        assert_eq!(err.kind(), "fetch_failure");
    }

    #[test]
    fn test_io_error_has_source() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.kind(), "io_error");
    }
}
