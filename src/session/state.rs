use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consensus::{ConsensusFilter, Detection};
use crate::error::{ErrorKind, ScanError};
use crate::matcher::match_order;
use crate::models::{DecodedCandidate, PurchaseRecord};
use crate::validator::{CarrierGuess, CodeValidator, Rejection, ValidatedCode};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScanState {
    #[default]
    Idle,
    RequestingPermission,
    Streaming,
    Detecting,
    Confirmed,
    Matched,
    NoMatch,
    Error,
}

impl ScanState {
    /// Waiting on the user to pick "Done" or "Scan Again".
    pub fn is_resolved(&self) -> bool {
        matches!(self, ScanState::Matched | ScanState::NoMatch)
    }

    /// Camera acquisition or sampling is in progress.
    pub fn is_scanning(&self) -> bool {
        matches!(
            self,
            ScanState::RequestingPermission
                | ScanState::Streaming
                | ScanState::Detecting
                | ScanState::Confirmed
        )
    }
}

/// Result of validating a consensus-confirmed code.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    Accepted(ValidatedCode),
    Rejected { code: String, rejection: Rejection },
}

/// Terminal outcome of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum Resolution {
    Matched {
        code: String,
        carrier: CarrierGuess,
        record: PurchaseRecord,
    },
    NoMatch {
        code: String,
        carrier: CarrierGuess,
    },
}

impl Resolution {
    pub fn code(&self) -> &str {
        match self {
            Resolution::Matched { code, .. } | Resolution::NoMatch { code, .. } => code,
        }
    }

    pub fn carrier(&self) -> CarrierGuess {
        match self {
            Resolution::Matched { carrier, .. } | Resolution::NoMatch { carrier, .. } => *carrier,
        }
    }

    pub fn record(&self) -> Option<&PurchaseRecord> {
        match self {
            Resolution::Matched { record, .. } => Some(record),
            Resolution::NoMatch { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProgress {
    pub code: String,
    pub count: u32,
}

/// Read-only view of a session for the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub session_id: String,
    pub state: ScanState,
    pub started_at: DateTime<Utc>,
    pub required_detections: u32,
    pub progress: Vec<CandidateProgress>,
    pub confirmed_code: Option<String>,
    pub carrier: Option<CarrierGuess>,
    pub matched_order: Option<PurchaseRecord>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
}

/// One scan attempt. Pure state; the controller owns camera and tasks.
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub id: String,
    pub state: ScanState,
    pub started_at: DateTime<Utc>,
    pub confirmed_code: Option<String>,
    pub carrier: Option<CarrierGuess>,
    pub matched_order: Option<PurchaseRecord>,
    pub last_error: Option<ScanError>,
    consensus: ConsensusFilter,
    records: Vec<PurchaseRecord>,
}

impl ScanSession {
    pub fn new(id: String, records: Vec<PurchaseRecord>, consensus: ConsensusFilter) -> Self {
        Self {
            id,
            state: ScanState::Idle,
            started_at: Utc::now(),
            confirmed_code: None,
            carrier: None,
            matched_order: None,
            last_error: None,
            consensus,
            records,
        }
    }

    pub fn records(&self) -> &[PurchaseRecord] {
        &self.records
    }

    pub fn count(&self, code: &str) -> u32 {
        self.consensus.count(code)
    }

    fn invalid(&self, action: &'static str) -> ScanError {
        ScanError::InvalidTransition {
            state: self.state,
            action,
        }
    }

    fn clear_attempt(&mut self) {
        self.consensus.reset();
        self.confirmed_code = None;
        self.carrier = None;
        self.matched_order = None;
        self.last_error = None;
    }

    pub fn request_permission(&mut self) -> Result<(), ScanError> {
        if self.state != ScanState::Idle {
            return Err(self.invalid("request camera permission"));
        }
        self.state = ScanState::RequestingPermission;
        Ok(())
    }

    /// Full re-acquisition from any state ("Try Again" / "Scan Again").
    pub fn restart(&mut self) {
        self.clear_attempt();
        self.state = ScanState::RequestingPermission;
    }

    pub fn stream_started(&mut self) -> Result<(), ScanError> {
        if self.state != ScanState::RequestingPermission {
            return Err(self.invalid("start streaming"));
        }
        self.state = ScanState::Streaming;
        Ok(())
    }

    /// Returns `true` when this was the first sampled frame.
    pub fn frame_sampled(&mut self) -> Result<bool, ScanError> {
        match self.state {
            ScanState::Streaming => {
                self.state = ScanState::Detecting;
                Ok(true)
            }
            ScanState::Detecting => Ok(false),
            _ => Err(self.invalid("sample a frame")),
        }
    }

    /// Count one decoded read. A confirming read moves the session to
    /// `Confirmed`.
    pub fn observe(&mut self, candidate: &DecodedCandidate) -> Result<Option<Detection>, ScanError> {
        if self.state != ScanState::Detecting {
            return Err(self.invalid("count a detection"));
        }

        let detection = self.consensus.observe(candidate);
        if let Some(detection) = &detection {
            if detection.confirmed {
                self.state = ScanState::Confirmed;
                self.confirmed_code = Some(detection.code.clone());
            }
        }
        Ok(detection)
    }

    /// Validate the confirmed code. A rejection sends the session back to
    /// `Detecting`.
    pub fn resolve_confirmation(
        &mut self,
        validator: &CodeValidator,
    ) -> Result<Confirmation, ScanError> {
        if self.state != ScanState::Confirmed {
            return Err(self.invalid("validate a confirmation"));
        }
        let code = self
            .confirmed_code
            .clone()
            .ok_or_else(|| self.invalid("validate a confirmation"))?;

        match validator.validate(&code) {
            Ok(validated) => {
                self.carrier = Some(validated.carrier);
                Ok(Confirmation::Accepted(validated))
            }
            Err(rejection) => {
                self.confirmed_code = None;
                self.state = ScanState::Detecting;
                Ok(Confirmation::Rejected { code, rejection })
            }
        }
    }

    /// Look the accepted code up in the session's purchase records.
    pub fn finish_match(&mut self, validated: ValidatedCode) -> Result<Resolution, ScanError> {
        if self.state != ScanState::Confirmed {
            return Err(self.invalid("match a code"));
        }
        Ok(self.apply_match(validated))
    }

    /// Manual entry: validate and match, skipping consensus. A rejected code
    /// leaves the session untouched.
    pub fn submit_manual(
        &mut self,
        validator: &CodeValidator,
        text: &str,
    ) -> Result<Resolution, ScanError> {
        if self.state == ScanState::Idle {
            return Err(self.invalid("enter a code"));
        }
        let validated = validator
            .validate(text)
            .map_err(ScanError::ValidationRejected)?;

        self.clear_attempt();
        Ok(self.apply_match(validated))
    }

    fn apply_match(&mut self, validated: ValidatedCode) -> Resolution {
        let ValidatedCode { code, carrier, .. } = validated;
        self.confirmed_code = Some(code.clone());
        self.carrier = Some(carrier);

        match match_order(&code, &self.records).cloned() {
            Some(record) => {
                self.state = ScanState::Matched;
                self.matched_order = Some(record.clone());
                Resolution::Matched {
                    code,
                    carrier,
                    record,
                }
            }
            None => {
                self.state = ScanState::NoMatch;
                self.matched_order = None;
                Resolution::NoMatch { code, carrier }
            }
        }
    }

    pub fn fail(&mut self, err: ScanError) {
        self.consensus.reset();
        self.state = ScanState::Error;
        self.last_error = Some(err);
    }

    /// The committed result, once the session is resolved.
    pub fn resolution(&self) -> Option<Resolution> {
        let code = self.confirmed_code.clone()?;
        let carrier = self.carrier?;
        match self.state {
            ScanState::Matched => self.matched_order.clone().map(|record| Resolution::Matched {
                code,
                carrier,
                record,
            }),
            ScanState::NoMatch => Some(Resolution::NoMatch { code, carrier }),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            session_id: self.id.clone(),
            state: self.state,
            started_at: self.started_at,
            required_detections: self.consensus.required(),
            progress: self
                .consensus
                .progress()
                .into_iter()
                .map(|(code, count)| CandidateProgress { code, count })
                .collect(),
            confirmed_code: self.confirmed_code.clone(),
            carrier: self.carrier,
            matched_order: self.matched_order.clone(),
            last_error: self.last_error.as_ref().map(ToString::to_string),
            last_error_kind: self.last_error.as_ref().map(ScanError::kind),
        }
    }
}
