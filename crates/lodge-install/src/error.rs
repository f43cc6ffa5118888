//! Error types for install operations.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error type returned by compensating actions and collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Candidate discovery errors.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("failed to walk install tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Why one compensating action did not complete.
#[derive(Debug, Error)]
pub enum RollbackCause {
    #[error("{0}")]
    Failed(BoxError),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("panicked")]
    Panicked,
}

#[derive(Debug)]
pub struct RollbackFailure {
    pub label: String,
    pub cause: RollbackCause,
}

/// Every compensating action that failed during one rollback, in the order
/// they were run.
#[derive(Debug)]
pub struct RollbackError {
    pub failures: Vec<RollbackFailure>,
}

impl RollbackError {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.label.as_str())
    }
}

impl fmt::Display for RollbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rollback incomplete, {} action(s) failed", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{}: {}", failure.label, failure.cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for RollbackError {}

/// Install orchestration errors.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("'{app_id}' is already installed at {path}")]
    AlreadyInstalled { app_id: String, path: PathBuf },

    #[error("no executable candidates found in {0}")]
    NoExecutableCandidates(PathBuf),

    #[error("invalid application name: '{0}'")]
    InvalidName(String),

    #[error("no {0} configured")]
    Unconfigured(&'static str),

    #[error(transparent)]
    Archive(#[from] lodge_archive::Error),

    #[error(transparent)]
    Fs(#[from] lodge_fs::Error),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{step} failed: {source}")]
    Collaborator {
        step: &'static str,
        source: BoxError,
    },

    /// A step failed and the transaction was rolled back.
    #[error("{source}{}", rollback_note(.rollback))]
    Failed {
        source: Box<InstallError>,
        rollback: Option<RollbackError>,
    },
}

impl InstallError {
    pub(crate) fn collaborator(step: &'static str) -> impl FnOnce(BoxError) -> Self {
        move |source| Self::Collaborator { step, source }
    }

    /// The error that triggered the rollback, or `self` for any other variant.
    pub fn root_cause(&self) -> &InstallError {
        match self {
            Self::Failed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

fn rollback_note(rollback: &Option<RollbackError>) -> String {
    match rollback {
        Some(err) => format!(" (warning: {err})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_error_lists_labels() {
        let err = RollbackError {
            failures: vec![
                RollbackFailure {
                    label: "remove wrapper script".into(),
                    cause: RollbackCause::Failed("permission denied".into()),
                },
                RollbackFailure {
                    label: "remove package foo".into(),
                    cause: RollbackCause::TimedOut(Duration::from_secs(5)),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 action(s) failed"));
        assert!(msg.contains("remove wrapper script: permission denied"));
        assert!(msg.contains("remove package foo: timed out"));
        assert_eq!(err.labels().collect::<Vec<_>>(), ["remove wrapper script", "remove package foo"]);
    }

    #[test]
    fn failed_reports_trigger_and_warning() {
        let err = InstallError::Failed {
            source: Box::new(InstallError::NoExecutableCandidates("/apps/foo".into())),
            rollback: Some(RollbackError {
                failures: vec![RollbackFailure {
                    label: "remove install directory".into(),
                    cause: RollbackCause::Panicked,
                }],
            }),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("no executable candidates found in /apps/foo"));
        assert!(msg.contains("warning: rollback incomplete"));
        assert!(matches!(err.root_cause(), InstallError::NoExecutableCandidates(_)));
    }
}
