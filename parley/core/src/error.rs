//! Error Taxonomy
//!
//! Every failure inside a turn is one of three classes:
//!
//! - **Recoverable**: the user's answer could not be used. The engine re-asks
//!   the same question, bounded by the prompt retry limit.
//! - **Domain**: a calendar or directory collaborator failed. The user gets a
//!   category-specific message and the task state is cleared.
//! - **Fatal**: an invariant was broken. The user gets one generic message,
//!   the state is cleared and the whole stack is cancelled.
//!
//! Only [`OrchestratorError`] ever leaves `on_turn`; it means the turn could
//! not be loaded or persisted at all.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dialog::FlowId;

/// Category of a collaborator failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillErrorKind {
    /// The API refused access to the resource
    AccessDenied,
    /// Credentials are missing or expired
    Unauthorized,
    /// The account may not perform this operation
    Forbidden,
    /// The request was malformed for this account
    BadRequest,
    /// The service asked us to slow down
    Throttled,
    /// The referenced item does not exist
    NotFound,
    /// Anything else
    Other,
}

impl SkillErrorKind {
    /// Whether the user should be told there is a problem with their account
    #[must_use]
    pub fn is_account_problem(self) -> bool {
        matches!(
            self,
            Self::AccessDenied | Self::Unauthorized | Self::Forbidden | Self::BadRequest
        )
    }
}

/// Error returned by calendar, directory and room collaborators
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ServiceError {
    /// The service answered but refused the request
    #[error("{service} rejected the request ({kind:?}): {message}")]
    Rejected {
        /// Which collaborator failed
        service: &'static str,
        /// Failure category
        kind: SkillErrorKind,
        /// Detail from the service
        message: String,
    },

    /// The service could not be reached
    #[error("{service} is unavailable: {message}")]
    Unavailable {
        /// Which collaborator failed
        service: &'static str,
        /// Detail from the transport
        message: String,
    },

    /// The service answered with something that does not fit the request
    #[error("{service} returned a malformed response: {message}")]
    Malformed {
        /// Which collaborator failed
        service: &'static str,
        /// What was wrong with it
        message: String,
    },
}

impl ServiceError {
    /// Failure category used to pick the user-facing message
    #[must_use]
    pub fn kind(&self) -> SkillErrorKind {
        match self {
            Self::Rejected { kind, .. } => *kind,
            Self::Unavailable { .. } | Self::Malformed { .. } => SkillErrorKind::Other,
        }
    }
}

/// How the engine reacts to a [`DialogError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Re-prompt the same step
    Recoverable,
    /// Tell the user, clear task state
    Domain,
    /// Tell the user, clear state, cancel the whole stack
    Fatal,
}

/// Error raised by a flow step
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DialogError {
    /// The user's answer was recognized but is not usable
    #[error("validation failed: {0}")]
    Validation(String),

    /// A collaborator call failed
    #[error("skill failure ({kind:?}): {message}")]
    Skill {
        /// Failure category
        kind: SkillErrorKind,
        /// Detail for the log
        message: String,
    },

    /// The user failed to answer a prompt too many times
    #[error("retry limit reached in {flow}")]
    RetryExhausted {
        /// Flow whose prompt was abandoned
        flow: FlowId,
    },

    /// An invariant of the engine or a flow was broken
    #[error("invariant violated: {0}")]
    Fatal(String),
}

impl DialogError {
    /// Shorthand for a slot a step expected to be populated
    #[must_use]
    pub fn missing(slot: &str) -> Self {
        Self::Fatal(format!("{slot} was expected to be set"))
    }

    /// Classify for the engine boundary
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Recoverable,
            Self::Skill { .. } => ErrorClass::Domain,
            Self::RetryExhausted { .. } | Self::Fatal(_) => ErrorClass::Fatal,
        }
    }
}

impl From<ServiceError> for DialogError {
    fn from(err: ServiceError) -> Self {
        Self::Skill {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Errors from a [`StateStore`](crate::store::StateStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded
    #[error("Failed to serialize conversation record: {0}")]
    Serde(#[from] serde_json::Error),

    /// A record exists but does not belong to the requested conversation
    #[error("Corrupt conversation record: {0}")]
    Corrupt(String),
}

/// Errors that escape [`Orchestrator::on_turn`](crate::orchestrator::Orchestrator::on_turn)
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Loading or saving the conversation failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_problem_kinds() {
        assert!(SkillErrorKind::AccessDenied.is_account_problem());
        assert!(SkillErrorKind::Unauthorized.is_account_problem());
        assert!(SkillErrorKind::Forbidden.is_account_problem());
        assert!(SkillErrorKind::BadRequest.is_account_problem());
        assert!(!SkillErrorKind::Throttled.is_account_problem());
        assert!(!SkillErrorKind::Other.is_account_problem());
    }

    #[test]
    fn test_service_error_converts_to_skill() {
        let err = ServiceError::Rejected {
            service: "calendar",
            kind: SkillErrorKind::Forbidden,
            message: "no access".to_string(),
        };
        let dialog: DialogError = err.into();
        assert!(matches!(
            dialog,
            DialogError::Skill {
                kind: SkillErrorKind::Forbidden,
                ..
            }
        ));
        assert_eq!(dialog.classify(), ErrorClass::Domain);
    }

    #[test]
    fn test_unavailable_is_generic() {
        let err = ServiceError::Unavailable {
            service: "directory",
            message: "timeout".to_string(),
        };
        assert_eq!(err.kind(), SkillErrorKind::Other);
        assert!(err.to_string().contains("directory"));
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            DialogError::Validation("bad date".into()).classify(),
            ErrorClass::Recoverable
        );
        assert_eq!(DialogError::missing("start").classify(), ErrorClass::Fatal);
        assert_eq!(
            DialogError::RetryExhausted {
                flow: FlowId::UpdateStartTime
            }
            .classify(),
            ErrorClass::Fatal
        );
    }
}
