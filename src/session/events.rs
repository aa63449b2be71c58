use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{ErrorKind, Recovery, ScanError};
use crate::feedback::FeedbackCue;
use crate::models::PurchaseRecord;
use crate::validator::CarrierGuess;

use super::state::{Resolution, ScanState};

/// Notifications pushed to the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ScanEvent {
    StateChanged {
        session_id: String,
        state: ScanState,
    },
    /// A candidate was counted but has not yet reached consensus.
    Progress {
        session_id: String,
        code: String,
        count: u32,
        required: u32,
    },
    Confirmed {
        session_id: String,
        code: String,
        carrier: CarrierGuess,
    },
    Matched {
        session_id: String,
        code: String,
        carrier: CarrierGuess,
        record: PurchaseRecord,
    },
    NoMatch {
        session_id: String,
        code: String,
        carrier: CarrierGuess,
    },
    Error {
        session_id: String,
        kind: ErrorKind,
        message: String,
        recovery: Vec<Recovery>,
    },
    /// Haptic pattern for hosts that vibrate; audio is played in-process.
    Cue {
        session_id: String,
        cue: FeedbackCue,
        vibration_ms: Vec<u64>,
    },
}

impl ScanEvent {
    pub fn session_id(&self) -> &str {
        match self {
            ScanEvent::StateChanged { session_id, .. }
            | ScanEvent::Progress { session_id, .. }
            | ScanEvent::Confirmed { session_id, .. }
            | ScanEvent::Matched { session_id, .. }
            | ScanEvent::NoMatch { session_id, .. }
            | ScanEvent::Error { session_id, .. }
            | ScanEvent::Cue { session_id, .. } => session_id,
        }
    }

    pub(crate) fn state(session_id: &str, state: ScanState) -> Self {
        ScanEvent::StateChanged {
            session_id: session_id.to_string(),
            state,
        }
    }

    pub(crate) fn error(session_id: &str, err: &ScanError) -> Self {
        ScanEvent::Error {
            session_id: session_id.to_string(),
            kind: err.kind(),
            message: err.to_string(),
            recovery: err.recovery().to_vec(),
        }
    }

    pub(crate) fn resolved(session_id: &str, resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Matched {
                code,
                carrier,
                record,
            } => ScanEvent::Matched {
                session_id: session_id.to_string(),
                code: code.clone(),
                carrier: *carrier,
                record: record.clone(),
            },
            Resolution::NoMatch { code, carrier } => ScanEvent::NoMatch {
                session_id: session_id.to_string(),
                code: code.clone(),
                carrier: *carrier,
            },
        }
    }

    pub(crate) fn cue(session_id: &str, cue: FeedbackCue) -> Self {
        ScanEvent::Cue {
            session_id: session_id.to_string(),
            cue,
            vibration_ms: cue.vibration_pattern().to_vec(),
        }
    }
}

/// Where scan events go. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

impl EventSink for mpsc::UnboundedSender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        // The host dropping its receiver just means nobody is watching.
        let _ = self.send(event);
    }
}

/// An in-process event sink and the receiver the host drains.
pub fn event_channel() -> (Arc<dyn EventSink>, mpsc::UnboundedReceiver<ScanEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}
