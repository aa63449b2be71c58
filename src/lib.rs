//! Package barcode scanning and tracking-number reconciliation.
//!
//! A [`ScanController`] owns one scan session at a time: it acquires a
//! [`capture::CaptureSource`], samples frames on a [`SamplingClock`], decodes
//! them through a [`decoder::DecodeEngine`], waits for repeated agreement in
//! the [`ConsensusFilter`], validates the winner and looks it up among the
//! caller's purchase records. Progress and results are pushed to the host as
//! [`ScanEvent`]s.

mod utils;

pub mod capture;
pub mod config;
pub mod consensus;
pub mod db;
pub mod decoder;
pub mod error;
pub mod feedback;
pub mod ingest;
pub mod matcher;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod validator;

pub use capture::{Availability, Facing, Frame, FrameFeeder, PushCamera};
pub use config::ScanConfig;
pub use consensus::{ConsensusFilter, Detection};
pub use db::Database;
pub use decoder::{DecodeEngine, DecodeOutcome, Decoder};
pub use error::{ErrorKind, Recovery, ScanError};
pub use feedback::{Feedback, FeedbackCue, NullFeedback};
pub use matcher::{match_order, normalize};
pub use models::{DecodedCandidate, PurchaseInput, PurchaseRecord, PurchaseSource, Symbology};
pub use scheduler::{ManualClock, ManualTrigger, SamplingClock};
pub use session::{
    event_channel, EventSink, Resolution, ScanController, ScanControllerBuilder, ScanEvent,
    ScanSnapshot, ScanState,
};
pub use settings::{ScanSettings, SettingsStore};
pub use utils::logging::{init_logging, DEBUG_ENV};
pub use validator::{CarrierGuess, CodeValidator, Rejection, ValidatedCode};
