use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::capture::FrameStream;
use crate::decoder::DecodeOutcome;
use crate::error::ScanError;
use crate::feedback::FeedbackCue;

use super::controller::{ScanDeps, Slot};
use super::events::ScanEvent;
use super::state::{Confirmation, ScanSession, ScanState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// The session this task still owns, or `None` once it has been cancelled,
/// reset or replaced. Late results must be dropped when this returns `None`.
fn active_session<'a>(
    slot: &'a mut Slot,
    session_id: &str,
    cancel: &CancellationToken,
) -> Option<&'a mut ScanSession> {
    if cancel.is_cancelled() {
        return None;
    }
    slot.session
        .as_mut()
        .filter(|session| session.id == session_id)
}

/// Acquire the camera, then sample, decode and count until a code is
/// accepted, the stream fails or the task is cancelled.
///
/// Consensus alone does not play the detected cue or release the camera.
/// Both wait for the validator: a rejected confirmation reports an error,
/// stays silent and keeps sampling the same stream.
pub(crate) async fn scan_loop(
    deps: Arc<ScanDeps>,
    slot: Arc<Mutex<Slot>>,
    session_id: String,
    cancel: CancellationToken,
) {
    let capture = Arc::clone(&deps.capture);
    let facing = deps.config.facing;
    let acquire = tokio::task::spawn_blocking(move || capture.acquire(facing));

    let acquired = tokio::select! {
        result = acquire => result.unwrap_or_else(|err| {
            Err(ScanError::StreamInterrupted(format!("camera request failed: {err}")))
        }),
        _ = cancel.cancelled() => {
            log_info!("scan {} cancelled while requesting the camera", session_id);
            return;
        }
    };

    let mut stream = match acquired {
        Ok(stream) => stream,
        Err(err) => {
            fail_session(&deps, &slot, &session_id, &cancel, err).await;
            return;
        }
    };

    {
        let mut guard = slot.lock().await;
        let Some(session) = active_session(&mut guard, &session_id, &cancel) else {
            log_debug!("scan {} gone before the camera opened", session_id);
            return;
        };
        if let Err(err) = session.stream_started() {
            log_warn!("scan {}: {}", session_id, err);
            return;
        }
        deps.emit(ScanEvent::state(&session_id, ScanState::Streaming));
    }

    let mut ticks = deps.clock.start();
    loop {
        let ticked = tokio::select! {
            ticked = ticks.next() => ticked,
            _ = cancel.cancelled() => {
                log_info!("scan loop {} shutting down", session_id);
                return;
            }
        };

        if !ticked {
            drop(stream);
            let err = ScanError::StreamInterrupted("sampling clock stopped".into());
            fail_session(&deps, &slot, &session_id, &cancel, err).await;
            return;
        }

        let frame = match stream.latest_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) => {
                drop(stream);
                fail_session(&deps, &slot, &session_id, &cancel, err).await;
                return;
            }
        };

        {
            let mut guard = slot.lock().await;
            let Some(session) = active_session(&mut guard, &session_id, &cancel) else {
                return;
            };
            match session.frame_sampled() {
                Ok(true) => deps.emit(ScanEvent::state(&session_id, ScanState::Detecting)),
                Ok(false) => {}
                Err(err) => {
                    log_warn!("scan {}: {}", session_id, err);
                    return;
                }
            }
        }

        let sequence = frame.sequence;
        let outcome = tokio::select! {
            outcome = deps.decoder.decode(frame) => outcome,
            _ = cancel.cancelled() => {
                log_debug!("scan {} dropping in-flight decode of frame {}", session_id, sequence);
                return;
            }
        };

        let candidate = match outcome {
            Ok(DecodeOutcome::Found(candidate)) => candidate,
            Ok(DecodeOutcome::NotFound | DecodeOutcome::Unchanged) => continue,
            Err(err) => {
                drop(stream);
                fail_session(&deps, &slot, &session_id, &cancel, err).await;
                return;
            }
        };

        let mut guard = slot.lock().await;
        let Some(session) = active_session(&mut guard, &session_id, &cancel) else {
            log_debug!("scan {} discarding late read of frame {}", session_id, sequence);
            return;
        };

        let detection = match session.observe(&candidate) {
            Ok(Some(detection)) => detection,
            Ok(None) => continue,
            Err(err) => {
                log_warn!("scan {}: {}", session_id, err);
                continue;
            }
        };

        deps.emit(ScanEvent::Progress {
            session_id: session_id.clone(),
            code: detection.code.clone(),
            count: detection.count,
            required: detection.required,
        });
        if !detection.confirmed {
            continue;
        }

        log_info!(
            "scan {} reached consensus on {} after {} reads",
            session_id,
            detection.code,
            detection.count
        );
        deps.emit(ScanEvent::state(&session_id, ScanState::Confirmed));

        let validated = match session.resolve_confirmation(&deps.validator) {
            Ok(Confirmation::Accepted(validated)) => validated,
            Ok(Confirmation::Rejected { code, rejection }) => {
                log_info!("scan {} rejected {}: {}", session_id, code, rejection);
                let err = ScanError::ValidationRejected(rejection);
                deps.emit(ScanEvent::error(&session_id, &err));
                deps.emit(ScanEvent::state(&session_id, ScanState::Detecting));
                continue;
            }
            Err(err) => {
                log_warn!("scan {}: {}", session_id, err);
                continue;
            }
        };

        deps.cue(&session_id, FeedbackCue::Detected);
        deps.emit(ScanEvent::Confirmed {
            session_id: session_id.clone(),
            code: validated.code.clone(),
            carrier: validated.carrier,
        });

        release_stream(&deps, stream);

        match session.finish_match(validated) {
            Ok(resolution) => deps.resolved(&session_id, &resolution),
            Err(err) => log_warn!("scan {}: {}", session_id, err),
        }
        return;
    }
}

fn release_stream(deps: &ScanDeps, stream: Box<dyn FrameStream>) {
    drop(stream);
    deps.capture.release();
}

async fn fail_session(
    deps: &ScanDeps,
    slot: &Mutex<Slot>,
    session_id: &str,
    cancel: &CancellationToken,
    err: ScanError,
) {
    let mut guard = slot.lock().await;
    let Some(session) = active_session(&mut guard, session_id, cancel) else {
        log_debug!("scan {} ignoring error after shutdown: {}", session_id, err);
        return;
    };

    // A failed stream must not keep the device, whatever the caller does next.
    deps.capture.release();
    log_error!("scan {} failed: {}", session_id, err);

    session.fail(err.clone());
    deps.emit(ScanEvent::error(session_id, &err));
    deps.emit(ScanEvent::state(session_id, ScanState::Error));
    deps.cue(session_id, FeedbackCue::Error);
}
