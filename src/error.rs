//! Unified error handling for relaycast.
//!
//! The taxonomy mirrors what each failure means for the event loop: a
//! user-visible denial, a recoverable per-recipient condition, or a logged
//! internal fault. Nothing here is fatal to the process - the dispatcher
//! resolves every variant to either a state change or a reply.

use crate::store::StoreError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors that can occur while handling one broadcast event or command.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A non-privileged user invoked a privileged operation. No state change.
    #[error("permission denied")]
    PermissionDenied,

    /// A reply target resolved to no ledger record. No state change.
    #[error("no matching relay record")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RelayError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::Store(_) => "store_error",
            Self::Transport(_) => "transport_error",
        }
    }

    /// The reply text shown to the issuing user, if the error warrants one.
    ///
    /// Store and transport faults are logged but never surfaced verbatim.
    pub fn user_reply(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied => Some("You don't have permission to use this command."),
            Self::NotFound => Some("Something went wrong."),
            Self::Store(_) | Self::Transport(_) => None,
        }
    }
}

/// Result type for event and command handlers.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RelayError::PermissionDenied.error_code(), "permission_denied");
        assert_eq!(RelayError::NotFound.error_code(), "not_found");
    }

    #[test]
    fn test_user_replies() {
        assert!(RelayError::PermissionDenied.user_reply().is_some());
        assert_eq!(RelayError::NotFound.user_reply(), Some("Something went wrong."));

        // Internal faults don't generate user-visible replies
        let err = RelayError::Transport(TransportError::Unreachable);
        assert!(err.user_reply().is_none());
    }
}
