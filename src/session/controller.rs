use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::CaptureSource;
use crate::config::ScanConfig;
use crate::consensus::ConsensusFilter;
use crate::decoder::{DecodeEngine, Decoder};
use crate::error::ScanError;
use crate::feedback::{Feedback, FeedbackCue, NullFeedback};
use crate::models::{PurchaseRecord, Symbology};
use crate::scheduler::SamplingClock;
use crate::validator::CodeValidator;

use super::events::{EventSink, ScanEvent};
use super::loop_worker::scan_loop;
use super::state::{Resolution, ScanSession, ScanSnapshot, ScanState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Everything a session's sampling task needs besides the session itself.
pub(crate) struct ScanDeps {
    pub(crate) capture: Arc<dyn CaptureSource>,
    pub(crate) decoder: Decoder,
    pub(crate) validator: CodeValidator,
    pub(crate) clock: SamplingClock,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) feedback: Arc<dyn Feedback>,
    pub(crate) config: ScanConfig,
}

impl ScanDeps {
    pub(crate) fn emit(&self, event: ScanEvent) {
        self.events.emit(event);
    }

    /// Play a cue locally and forward its haptic pattern to the host.
    pub(crate) fn cue(&self, session_id: &str, cue: FeedbackCue) {
        self.feedback.play(cue);
        if self.config.haptics {
            self.events.emit(ScanEvent::cue(session_id, cue));
        }
    }

    pub(crate) fn resolved(&self, session_id: &str, resolution: &Resolution) {
        self.emit(ScanEvent::resolved(session_id, resolution));
        let (state, cue) = match resolution {
            Resolution::Matched { .. } => (ScanState::Matched, FeedbackCue::Success),
            Resolution::NoMatch { .. } => (ScanState::NoMatch, FeedbackCue::Warning),
        };
        self.emit(ScanEvent::state(session_id, state));
        self.cue(session_id, cue);
    }

    fn new_session(&self, id: String, records: Vec<PurchaseRecord>) -> ScanSession {
        let consensus = ConsensusFilter::new(self.config.required_detections)
            .with_min_confidence(self.config.min_confidence);
        ScanSession::new(id, records, consensus)
    }
}

struct Worker {
    session_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct Slot {
    pub(crate) session: Option<ScanSession>,
    worker: Option<Worker>,
}

/// Owns the single scan session and its sampling task.
#[derive(Clone)]
pub struct ScanController {
    slot: Arc<Mutex<Slot>>,
    deps: Arc<ScanDeps>,
}

pub struct ScanControllerBuilder {
    capture: Arc<dyn CaptureSource>,
    engine: Arc<dyn DecodeEngine>,
    events: Arc<dyn EventSink>,
    config: ScanConfig,
    clock: Option<SamplingClock>,
    feedback: Arc<dyn Feedback>,
    symbologies: Option<Vec<Symbology>>,
}

impl ScanControllerBuilder {
    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the sampling clock. Defaults to an interval at
    /// `ScanConfig::sample_interval`.
    pub fn with_clock(mut self, clock: SamplingClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_symbologies(mut self, symbologies: impl IntoIterator<Item = Symbology>) -> Self {
        self.symbologies = Some(symbologies.into_iter().collect());
        self
    }

    pub fn build(self) -> ScanController {
        let mut decoder =
            Decoder::new(self.engine).with_static_frame_gate(self.config.static_frame_threshold);
        if let Some(symbologies) = self.symbologies {
            decoder = decoder.with_symbologies(symbologies);
        }

        let clock = self
            .clock
            .unwrap_or_else(|| SamplingClock::interval(self.config.sample_interval));

        ScanController {
            slot: Arc::new(Mutex::new(Slot::default())),
            deps: Arc::new(ScanDeps {
                capture: self.capture,
                decoder,
                validator: CodeValidator::new(self.config.min_code_length),
                clock,
                events: self.events,
                feedback: self.feedback,
                config: self.config,
            }),
        }
    }
}

impl ScanController {
    pub fn builder(
        capture: Arc<dyn CaptureSource>,
        engine: Arc<dyn DecodeEngine>,
        events: Arc<dyn EventSink>,
    ) -> ScanControllerBuilder {
        ScanControllerBuilder {
            capture,
            engine,
            events,
            config: ScanConfig::default(),
            clock: None,
            feedback: Arc::new(NullFeedback),
            symbologies: None,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.deps.config
    }

    /// Begin a session against `records` and start acquiring the camera.
    pub async fn start_scan(&self, records: Vec<PurchaseRecord>) -> Result<String, ScanError> {
        let mut guard = self.slot.lock().await;
        if guard.session.is_some() {
            return Err(ScanError::SessionActive);
        }
        if self.deps.capture.is_held() {
            return Err(ScanError::DeviceBusy);
        }

        let session_id = Uuid::new_v4().to_string();
        let mut session = self.deps.new_session(session_id.clone(), records);
        session.request_permission()?;
        self.deps.emit(ScanEvent::state(&session_id, session.state));

        log_info!(
            "scan {} started with {} purchase records (engine {})",
            session_id,
            session.records().len(),
            self.deps.decoder.engine_name()
        );

        guard.session = Some(session);
        self.deps.decoder.clear_static_frame();
        self.spawn_worker(&mut guard, &session_id);
        Ok(session_id)
    }

    /// Stop sampling, release the camera and drop the session. Calling it
    /// with nothing running is a no-op.
    pub async fn cancel(&self) {
        let worker = {
            let mut guard = self.slot.lock().await;
            let worker = guard.worker.take();
            if let Some(worker) = &worker {
                worker.cancel.cancel();
            }

            match guard.session.take() {
                Some(session) => {
                    self.deps.capture.release();
                    log_info!("scan {} cancelled in {:?}", session.id, session.state);
                    self.deps.emit(ScanEvent::state(&session.id, ScanState::Idle));
                }
                None if worker.is_some() => self.deps.capture.release(),
                None => {}
            }
            worker
        };

        if let Some(worker) = worker {
            join_worker(worker).await;
        }
    }

    /// Re-acquire the camera and start counting from scratch. Used for both
    /// "Try Again" after an error and "Scan Again" after a result.
    ///
    /// The previous worker is joined, and its stream dropped, before the
    /// next acquisition starts.
    pub async fn reset(&self) -> Result<(), ScanError> {
        let (session_id, previous) = {
            let mut guard = self.slot.lock().await;
            let session = guard.session.as_mut().ok_or(ScanError::NoActiveSession)?;
            let from = session.state;
            session.restart();
            let session_id = session.id.clone();

            let previous = guard.worker.take();
            if let Some(worker) = &previous {
                worker.cancel.cancel();
            }
            self.deps.capture.release();

            log_info!("scan {} reset from {:?}", session_id, from);
            self.deps
                .emit(ScanEvent::state(&session_id, ScanState::RequestingPermission));
            (session_id, previous)
        };

        if let Some(worker) = previous {
            join_worker(worker).await;
        }

        let mut guard = self.slot.lock().await;
        let still_waiting = guard.worker.is_none()
            && guard.session.as_ref().is_some_and(|session| {
                session.id == session_id && session.state == ScanState::RequestingPermission
            });
        if !still_waiting {
            log_debug!("scan {} changed while resetting; not reopening the camera", session_id);
            return Ok(());
        }
        self.deps.decoder.clear_static_frame();
        self.spawn_worker(&mut guard, &session_id);
        Ok(())
    }

    /// Resolve the session from typed text, bypassing the camera and
    /// consensus. A rejected entry is reported and leaves the session as it
    /// was.
    pub async fn submit_manual_code(&self, text: &str) -> Result<Resolution, ScanError> {
        let (resolution, worker) = {
            let mut guard = self.slot.lock().await;
            let session = guard.session.as_mut().ok_or(ScanError::NoActiveSession)?;
            let session_id = session.id.clone();

            let resolution = match session.submit_manual(&self.deps.validator, text) {
                Ok(resolution) => resolution,
                Err(err) => {
                    log_info!("scan {} manual entry refused: {}", session_id, err);
                    self.deps.emit(ScanEvent::error(&session_id, &err));
                    return Err(err);
                }
            };

            let worker = guard.worker.take();
            if let Some(worker) = &worker {
                worker.cancel.cancel();
            }
            self.deps.capture.release();

            log_info!(
                "scan {} resolved manually as {:?}",
                session_id,
                resolution.carrier()
            );
            self.deps.resolved(&session_id, &resolution);
            (resolution, worker)
        };

        if let Some(worker) = worker {
            join_worker(worker).await;
        }
        Ok(resolution)
    }

    /// Commit a Matched/NoMatch result and close the session.
    pub async fn done(&self) -> Result<Resolution, ScanError> {
        let (resolution, worker) = {
            let mut guard = self.slot.lock().await;
            let session = guard.session.as_ref().ok_or(ScanError::NoActiveSession)?;
            let resolution = session.resolution().ok_or(ScanError::InvalidTransition {
                state: session.state,
                action: "finish",
            })?;
            let session_id = session.id.clone();

            guard.session = None;
            self.deps.capture.release();
            self.deps.emit(ScanEvent::state(&session_id, ScanState::Idle));
            log_info!("scan {} done: {}", session_id, resolution.code());

            (resolution, guard.worker.take())
        };

        if let Some(worker) = worker {
            worker.cancel.cancel();
            join_worker(worker).await;
        }
        Ok(resolution)
    }

    pub async fn snapshot(&self) -> Option<ScanSnapshot> {
        self.slot
            .lock()
            .await
            .session
            .as_ref()
            .map(ScanSession::snapshot)
    }

    pub async fn state(&self) -> ScanState {
        self.slot
            .lock()
            .await
            .session
            .as_ref()
            .map(|session| session.state)
            .unwrap_or_default()
    }

    fn spawn_worker(&self, slot: &mut Slot, session_id: &str) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scan_loop(
            Arc::clone(&self.deps),
            Arc::clone(&self.slot),
            session_id.to_string(),
            cancel.clone(),
        ));

        slot.worker = Some(Worker {
            session_id: session_id.to_string(),
            cancel,
            handle,
        });
    }
}

async fn join_worker(worker: Worker) {
    if let Err(err) = worker.handle.await {
        log_warn!(
            "scan worker for {} did not shut down cleanly: {err}",
            worker.session_id
        );
    }
}
