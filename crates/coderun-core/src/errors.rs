//! Error types for the execution pipeline
//!
//! Two layers of errors exist. `ExecutionError` is what callers of the
//! orchestrator see: request validation failures (unsafe code, unknown
//! language) and the infrastructure failures that drive backend failover.
//! `EngineError` lives at the container-daemon boundary, where raw daemon
//! failures are classified once into a small typed set so nothing above the
//! engine has to inspect error strings.
//!
//! Image-missing, runtime failures and timeouts are *not* errors from the
//! caller's point of view: they are well-formed `ExecutionResult` values.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Code rejected by safety check: {0}")]
    UnsafeCode(String),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Execution infrastructure failure: {0}")]
    Infrastructure(String),
    #[error("Execution cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ExecutionError {
    /// Validation failures are rejected before any resource is allocated.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            ExecutionError::UnsafeCode(_)
                | ExecutionError::UnsupportedLanguage(_)
                | ExecutionError::InvalidRequest(_)
        )
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        ExecutionError::Infrastructure(err.to_string())
    }
}

// Errors raised by a container engine call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Docker image {0} not found")]
    ImageUnavailable(String),
    #[error("Container did not finish within {0} seconds")]
    Timeout(u64),
    #[error("Container engine is unreachable: {0}")]
    Unreachable(String),
    #[error("Container engine API error: {0}")]
    Api(String),
    #[error("I/O error during container operation: {0}")]
    Io(String),
}

impl EngineError {
    /// Classifies a daemon error. `image` names the image the failing call
    /// referred to, so that a missing image can be reported by name.
    pub fn classify(err: bollard::errors::Error, image: &str) -> Self {
        use bollard::errors::Error as BollardError;

        match err {
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => {
                let lowered = message.to_lowercase();
                if status_code == 404 && lowered.contains("image") {
                    EngineError::ImageUnavailable(image.to_string())
                } else if lowered.contains("timed out") || lowered.contains("timeout") {
                    EngineError::Timeout(0)
                } else {
                    EngineError::Api(format!("{} (HTTP {})", message, status_code))
                }
            }
            BollardError::RequestTimeoutError => EngineError::Timeout(0),
            BollardError::SocketNotFoundError(path) => {
                EngineError::Unreachable(format!("socket not found: {}", path))
            }
            BollardError::IOError { err } => EngineError::Unreachable(err.to_string()),
            other => Self::classify_message(&other.to_string(), image),
        }
    }

    /// Fallback classification for errors that only carry a message.
    pub fn classify_message(message: &str, image: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("no such image") || lowered.contains("pull access denied") {
            EngineError::ImageUnavailable(image.to_string())
        } else if lowered.contains("timed out") || lowered.contains("timeout") {
            EngineError::Timeout(0)
        } else if lowered.contains("connection refused")
            || lowered.contains("error trying to connect")
            || lowered.contains("client error (connect)")
            || lowered.contains("cannot connect")
        {
            EngineError::Unreachable(message.to_string())
        } else {
            EngineError::Api(message.to_string())
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_image_is_classified_by_status_and_message() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such image: python:3.9-alpine".to_string(),
        };
        assert_eq!(
            EngineError::classify(err, "python:3.9-alpine"),
            EngineError::ImageUnavailable("python:3.9-alpine".to_string())
        );
    }

    #[test]
    fn test_missing_container_is_not_an_image_failure() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".to_string(),
        };
        assert!(matches!(
            EngineError::classify(err, "node:18-alpine"),
            EngineError::Api(_)
        ));
    }

    #[test]
    fn test_socket_errors_mean_unreachable() {
        let err = bollard::errors::Error::SocketNotFoundError("/var/run/docker.sock".to_string());
        assert!(matches!(
            EngineError::classify(err, "any"),
            EngineError::Unreachable(_)
        ));
    }

    #[test]
    fn test_message_classification() {
        assert!(matches!(
            EngineError::classify_message("operation timed out", "img"),
            EngineError::Timeout(_)
        ));
        assert!(matches!(
            EngineError::classify_message("Connection refused (os error 111)", "img"),
            EngineError::Unreachable(_)
        ));
        assert!(matches!(
            EngineError::classify_message("conflict: name already in use", "img"),
            EngineError::Api(_)
        ));
    }

    #[test]
    fn test_validation_failures() {
        assert!(ExecutionError::UnsafeCode("os.".into()).is_validation_failure());
        assert!(ExecutionError::UnsupportedLanguage("cobol".into()).is_validation_failure());
        assert!(!ExecutionError::Infrastructure("down".into()).is_validation_failure());
    }
}
