//! Error types for parsing, evaluation and convergence.
//!
//! Errors are categorized so the executor can report each failed resource
//! as a resolution, permission, binding, configuration or execution problem.

use crate::resources::IDENTITY_EXIT_CODE;
use thiserror::Error;

/// Broad error categories recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A referenced file, template or package could not be found
    Resolution,
    /// Target not writable, unknown owner/group, install not permitted
    Permission,
    /// Template references an unbound variable or is malformed
    Binding,
    /// Invalid configuration
    Config,
    /// Transport or script failure not covered above
    Execution,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolution => "resolution",
            Self::Permission => "permission",
            Self::Binding => "binding",
            Self::Config => "config",
            Self::Execution => "execution",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Referenced source/template missing or unreadable, package unknown
    #[error("resolution error: {0}")]
    Resolution(String),

    #[error("permission error: {0}")]
    Permission(String),

    /// Template variable not supplied or placeholder malformed
    #[error("binding error: {0}")]
    Binding(String),

    #[error("parse error in {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("{} validation error(s)", .0.len())]
    Validation(Vec<String>),

    #[error("config error: {0}")]
    Config(String),

    #[error("dependency cycle detected involving: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("exit code {exit_code}: {stderr}")]
    Apply { exit_code: i32, stderr: String },

    #[error("state error: {0}")]
    State(String),

    /// Not run because a resource it depends on failed in this run
    #[error("blocked: {0}")]
    Blocked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Resolution(_) => ErrorCategory::Resolution,
            Error::Permission(_) => ErrorCategory::Permission,
            Error::Binding(_) => ErrorCategory::Binding,
            Error::Parse { .. } | Error::Validation(_) | Error::Config(_) | Error::Cycle(_) => {
                ErrorCategory::Config
            }
            Error::Transport(_)
            | Error::Apply { .. }
            | Error::State(_)
            | Error::Blocked(_)
            | Error::Io(_) => ErrorCategory::Execution,
        }
    }

    /// Classify a failed apply script from its exit code and stderr.
    pub fn from_script_failure(exit_code: i32, stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        let lower = message.to_lowercase();

        if exit_code == IDENTITY_EXIT_CODE
            || lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("read-only file system")
            || lower.contains("are you root")
        {
            return Error::Permission(message);
        }

        if lower.contains("unable to locate package")
            || lower.contains("has no installation candidate")
        {
            return Error::Resolution(message);
        }

        Error::Apply {
            exit_code,
            stderr: message,
        }
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Resolution(m) => Error::Resolution(m.clone()),
            Error::Permission(m) => Error::Permission(m.clone()),
            Error::Binding(m) => Error::Binding(m.clone()),
            Error::Parse { origin, message } => Error::Parse {
                origin: origin.clone(),
                message: message.clone(),
            },
            Error::Validation(v) => Error::Validation(v.clone()),
            Error::Config(m) => Error::Config(m.clone()),
            Error::Cycle(v) => Error::Cycle(v.clone()),
            Error::Transport(m) => Error::Transport(m.clone()),
            Error::Apply { exit_code, stderr } => Error::Apply {
                exit_code: *exit_code,
                stderr: stderr.clone(),
            },
            Error::State(m) => Error::State(m.clone()),
            Error::Blocked(m) => Error::Blocked(m.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            Error::Resolution("x".into()).category(),
            ErrorCategory::Resolution
        );
        assert_eq!(Error::Binding("x".into()).category(), ErrorCategory::Binding);
        assert_eq!(
            Error::Validation(vec!["a".into()]).category(),
            ErrorCategory::Config
        );
        assert_eq!(
            Error::Transport("x".into()).category(),
            ErrorCategory::Execution
        );
    }

    #[test]
    fn test_script_failure_unknown_identity() {
        let e = Error::from_script_failure(IDENTITY_EXIT_CODE, "unknown owner: nobody2\n");
        assert_eq!(e.category(), ErrorCategory::Permission);
        assert!(e.to_string().contains("unknown owner: nobody2"));
    }

    #[test]
    fn test_script_failure_permission_denied() {
        let e = Error::from_script_failure(1, "bash: /app_setup.txt: Permission denied");
        assert_eq!(e.category(), ErrorCategory::Permission);

        let e = Error::from_script_failure(
            100,
            "E: Could not open lock file /var/lib/dpkg/lock-frontend - \
             open (13: Permission denied)\nE: are you root?",
        );
        assert_eq!(e.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_script_failure_package_not_found() {
        let e = Error::from_script_failure(100, "E: Unable to locate package crno");
        assert_eq!(e.category(), ErrorCategory::Resolution);
    }

    #[test]
    fn test_script_failure_other() {
        let e = Error::from_script_failure(2, "  something broke  ");
        assert_eq!(e.category(), ErrorCategory::Execution);
        assert_eq!(e.to_string(), "exit code 2: something broke");
    }

    #[test]
    fn test_clone_keeps_category() {
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let copy = io.clone();
        assert_eq!(copy.category(), ErrorCategory::Execution);
        assert_eq!(copy.to_string(), io.to_string());
        assert_eq!(Error::Binding("x".into()).clone().category(), ErrorCategory::Binding);
    }

    #[test]
    fn test_blocked_is_execution() {
        let e = Error::Blocked("dependency 'a' failed".into());
        assert_eq!(e.category(), ErrorCategory::Execution);
        assert_eq!(e.to_string(), "blocked: dependency 'a' failed");
    }

    #[test]
    fn test_validation_display() {
        let e = Error::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(e.to_string(), "2 validation error(s)");
        let e = Error::Cycle(vec!["a".into(), "b".into()]);
        assert_eq!(e.to_string(), "dependency cycle detected involving: a, b");
    }
}
