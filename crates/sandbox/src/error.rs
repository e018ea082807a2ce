//! Error types for snippet execution.
//!
//! Adapters never swallow failures: they normalise them into one of the
//! [`SandboxError`] variants and hand them to the driver, which is the only
//! place that decides between aborting and degrading.

use std::fmt;

/// A failure raised by a runtime while running a snippet.
///
/// `kind` names the runtime's own error category (`TypeError`,
/// `ZeroDivisionError`, ...). It doubles as a marker inside `message`:
/// Python tracebacks start with noise that ends right where the exception
/// class name first appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    /// Human-readable error text.
    pub message: String,
    /// Runtime-specific error category.
    pub kind: String,
}

impl RuntimeError {
    /// Create a runtime error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
        }
    }

    /// Drop everything in `message` before the first occurrence of `kind`.
    ///
    /// When `kind` is empty or absent from the message the error is returned
    /// unchanged.
    pub fn trimmed(self) -> Self {
        if self.kind.is_empty() {
            return self;
        }
        match self.message.find(&self.kind) {
            Some(start) => Self {
                message: self.message[start..].to_owned(),
                kind: self.kind,
            },
            None => self,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Errors from the sandbox layer.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum SandboxError {
    /// The snippet's return value violates the result shape contract.
    #[error("{message}")]
    Validation {
        /// What was wrong with the result.
        message: String,
        /// Item whose execution produced the result, for per-item runs.
        item_index: Option<usize>,
    },

    /// The snippet raised or threw while running.
    #[error("{0}")]
    Execution(RuntimeError),

    /// A requested dependency could not be installed.
    #[error("failed to install module `{module}`: {message}")]
    DependencyInstall {
        /// Module (or comma-joined modules) the installer was asked for.
        module: String,
        /// Installer output.
        message: String,
    },

    /// The snippet's result could not be converted to host-native data.
    #[error("could not convert result: {message}")]
    Conversion {
        /// Conversion failure description.
        message: String,
    },

    /// The interpreter itself is unavailable or broke mid-call.
    #[error("interpreter error: {message}")]
    Interpreter {
        /// What went wrong with the interpreter.
        message: String,
    },
}

impl SandboxError {
    /// Create a validation error that is not tied to a specific item.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            item_index: None,
        }
    }

    /// Create a validation error for item `index`.
    pub fn validation_at(message: impl Into<String>, index: usize) -> Self {
        Self::Validation {
            message: message.into(),
            item_index: Some(index),
        }
    }

    /// Create an interpreter error.
    pub fn interpreter(message: impl Into<String>) -> Self {
        Self::Interpreter {
            message: message.into(),
        }
    }

    /// Returns `true` when the failure is caused by the user's code rather
    /// than by the environment it runs in.
    pub fn is_snippet_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Execution(_) | Self::Conversion { .. }
        )
    }

    /// Text used for the `error` field of a degraded record.
    pub fn message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::Execution(error) => error.message.clone(),
            other => other.to_string(),
        }
    }

    /// Attach an item index to a validation error that has none.
    pub(crate) fn at_item(self, index: usize) -> Self {
        match self {
            Self::Validation {
                message,
                item_index: None,
            } => Self::Validation {
                message,
                item_index: Some(index),
            },
            other => other,
        }
    }
}

impl From<RuntimeError> for SandboxError {
    fn from(error: RuntimeError) -> Self {
        Self::Execution(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn trimming_starts_at_first_kind_occurrence() {
        let raw = "Traceback (most recent call last):\n  File \"<exec>\", line 3\nZeroDivisionError: division by zero";
        let error = RuntimeError::new("ZeroDivisionError", raw).trimmed();
        assert_eq!(error.message, "ZeroDivisionError: division by zero");
        assert_eq!(error.kind, "ZeroDivisionError");
    }

    #[rstest]
    #[case("KeyError", "something unrelated happened")]
    #[case("", "Traceback: ValueError: x")]
    fn trimming_leaves_message_without_marker(#[case] kind: &str, #[case] raw: &str) {
        let error = RuntimeError::new(kind, raw).trimmed();
        assert_eq!(error.message, raw);
    }

    #[test]
    fn trimming_at_position_zero_is_identity() {
        let raw = "TypeError: x is not a function";
        assert_eq!(RuntimeError::new("TypeError", raw).trimmed().message, raw);
    }

    #[test]
    fn snippet_errors_are_classified() {
        assert!(SandboxError::validation("bad").is_snippet_error());
        assert!(SandboxError::from(RuntimeError::new("Error", "x")).is_snippet_error());
        assert!(
            SandboxError::Conversion {
                message: "cycle".into()
            }
            .is_snippet_error()
        );
        assert!(!SandboxError::interpreter("gone").is_snippet_error());
        assert!(
            !SandboxError::DependencyInstall {
                module: "pandas".into(),
                message: "no network".into()
            }
            .is_snippet_error()
        );
    }

    #[test]
    fn degrade_message_is_the_bare_runtime_message() {
        let error = SandboxError::from(RuntimeError::new("TypeError", "TypeError: nope"));
        assert_eq!(error.message(), "TypeError: nope");
        assert_eq!(
            SandboxError::interpreter("exited").message(),
            "interpreter error: exited"
        );
    }

    #[test]
    fn at_item_only_fills_missing_index() {
        let error = SandboxError::validation("x").at_item(4);
        assert!(matches!(
            error,
            SandboxError::Validation {
                item_index: Some(4),
                ..
            }
        ));
        let error = SandboxError::validation_at("x", 1).at_item(4);
        assert!(matches!(
            error,
            SandboxError::Validation {
                item_index: Some(1),
                ..
            }
        ));
    }
}
