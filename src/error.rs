use serde::{Deserialize, Serialize};

use crate::session::ScanState;
use crate::validator::Rejection;

/// Failures surfaced by the scanning core.
///
/// Capture and decode failures are classified here by the lower layers; the
/// controller decides what the user is offered via [`ScanError::recovery`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera device found")]
    DeviceNotFound,

    #[error("camera device is busy")]
    DeviceBusy,

    #[error("camera stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("decode engine unavailable: {0}")]
    DecodeEngineUnavailable(String),

    #[error("code rejected: {0}")]
    ValidationRejected(Rejection),

    #[error("no active scan session")]
    NoActiveSession,

    #[error("a scan session is already active")]
    SessionActive,

    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: ScanState,
        action: &'static str,
    },
}

/// Serializable error classification carried by error events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    PermissionDenied,
    DeviceNotFound,
    DeviceBusy,
    StreamInterrupted,
    DecodeEngineUnavailable,
    ValidationRejected,
    NoActiveSession,
    SessionActive,
    InvalidTransition,
}

/// Path forward offered to the user after a failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Recovery {
    /// Re-acquire the camera and scan again.
    TryAgain,
    /// Bypass the camera and type the code.
    EnterManually,
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::PermissionDenied => ErrorKind::PermissionDenied,
            ScanError::DeviceNotFound => ErrorKind::DeviceNotFound,
            ScanError::DeviceBusy => ErrorKind::DeviceBusy,
            ScanError::StreamInterrupted(_) => ErrorKind::StreamInterrupted,
            ScanError::DecodeEngineUnavailable(_) => ErrorKind::DecodeEngineUnavailable,
            ScanError::ValidationRejected(_) => ErrorKind::ValidationRejected,
            ScanError::NoActiveSession => ErrorKind::NoActiveSession,
            ScanError::SessionActive => ErrorKind::SessionActive,
            ScanError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }

    /// Whether the session stays usable after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ScanError::ValidationRejected(_)
                | ScanError::NoActiveSession
                | ScanError::SessionActive
                | ScanError::InvalidTransition { .. }
        )
    }

    /// Recovery affordances in the order the UI should offer them. Never empty.
    pub fn recovery(&self) -> &'static [Recovery] {
        match self {
            // Retrying a denied or missing camera rarely helps; lead with typing.
            ScanError::PermissionDenied | ScanError::DeviceNotFound => {
                &[Recovery::EnterManually, Recovery::TryAgain]
            }
            ScanError::DecodeEngineUnavailable(_) => &[Recovery::EnterManually],
            ScanError::DeviceBusy | ScanError::StreamInterrupted(_) => {
                &[Recovery::TryAgain, Recovery::EnterManually]
            }
            ScanError::ValidationRejected(_) => &[Recovery::TryAgain, Recovery::EnterManually],
            ScanError::NoActiveSession
            | ScanError::SessionActive
            | ScanError::InvalidTransition { .. } => &[Recovery::TryAgain],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_offers_a_way_forward() {
        let errors = [
            ScanError::PermissionDenied,
            ScanError::DeviceNotFound,
            ScanError::DeviceBusy,
            ScanError::StreamInterrupted("track ended".into()),
            ScanError::DecodeEngineUnavailable("engine crashed".into()),
            ScanError::ValidationRejected(Rejection::TooShort { length: 3, min: 12 }),
            ScanError::NoActiveSession,
            ScanError::SessionActive,
            ScanError::InvalidTransition {
                state: ScanState::Idle,
                action: "finish",
            },
        ];

        for err in errors {
            assert!(!err.recovery().is_empty(), "{err} has no recovery");
        }
    }

    #[test]
    fn camera_failures_are_distinguishable() {
        assert_ne!(ScanError::PermissionDenied.kind(), ScanError::DeviceBusy.kind());
        assert_ne!(ScanError::DeviceNotFound.kind(), ScanError::DeviceBusy.kind());
        assert_eq!(
            ScanError::PermissionDenied.recovery()[0],
            Recovery::EnterManually
        );
        assert_eq!(ScanError::DeviceBusy.recovery()[0], Recovery::TryAgain);
    }

    #[test]
    fn validation_rejection_is_not_fatal() {
        let err = ScanError::ValidationRejected(Rejection::InvalidCharacter { ch: '-' });
        assert!(!err.is_fatal());
        assert!(ScanError::StreamInterrupted("unplugged".into()).is_fatal());
    }
}
