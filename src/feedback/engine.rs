//! Cue playback on a dedicated audio thread.
//!
//! rodio's output stream is not `Send`, so the stream and sink live on their
//! own thread and are driven over a command channel.

use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex, PoisonError,
};
use std::thread;

use log::warn;
use rodio::{OutputStream, Sink};

use super::{CueTone, Feedback, FeedbackCue};

enum AudioCommand {
    Play(FeedbackCue),
    SetVolume(f32),
    SetEnabled(bool),
}

pub struct AudioFeedback {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
    initial_volume: f32,
}

impl AudioFeedback {
    pub fn new(volume: f32) -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            initial_volume: volume.clamp(0.0, 1.0),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let initial_volume = self.initial_volume;

        thread::Builder::new()
            .name("scan-feedback-audio".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;
                let mut volume = initial_volume;
                let mut enabled = true;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Play(cue) => {
                            if !enabled {
                                continue;
                            }
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink) {
                                warn!("feedback cue {cue:?} dropped: {err}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                s.append(CueTone::new(cue, volume));
                            }
                        }
                        AudioCommand::SetVolume(v) => {
                            volume = v.clamp(0.0, 1.0);
                        }
                        AudioCommand::SetEnabled(on) => {
                            enabled = on;
                            if !on {
                                if let Some(s) = sink.take() {
                                    s.stop();
                                }
                                _stream = None;
                            }
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), String> {
        let tx = self.ensure_thread()?;
        tx.send(AudioCommand::SetVolume(volume))
            .map_err(|e| e.to_string())
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), String> {
        let tx = self.ensure_thread()?;
        tx.send(AudioCommand::SetEnabled(enabled))
            .map_err(|e| e.to_string())
    }
}

impl Feedback for AudioFeedback {
    fn play(&self, cue: FeedbackCue) {
        let sent = self
            .ensure_thread()
            .and_then(|tx| tx.send(AudioCommand::Play(cue)).map_err(|e| e.to_string()));
        if let Err(err) = sent {
            warn!("failed to queue feedback cue {cue:?}: {err}");
        }
    }
}
