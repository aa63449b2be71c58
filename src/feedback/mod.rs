//! Audio and haptic cues for scan milestones.

#[cfg(feature = "audio")]
pub mod engine;
pub mod tone;

use serde::{Deserialize, Serialize};

#[cfg(feature = "audio")]
pub use engine::AudioFeedback;
pub use tone::CueTone;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackCue {
    /// A code was confirmed by consensus and accepted.
    Detected,
    /// The code matched a purchase.
    Success,
    /// Valid code, no matching purchase.
    Warning,
    /// The session entered the error state.
    Error,
}

impl FeedbackCue {
    /// Tone segments as `(frequency_hz, duration_ms)`; a zero frequency is a gap.
    pub fn segments(&self) -> &'static [(f32, u32)] {
        match self {
            FeedbackCue::Detected => &[(1320.0, 70)],
            FeedbackCue::Success => &[(880.0, 90), (0.0, 30), (1320.0, 120)],
            FeedbackCue::Warning => &[(660.0, 180)],
            FeedbackCue::Error => &[(440.0, 150), (0.0, 40), (330.0, 220)],
        }
    }

    /// Vibration pattern (on/off milliseconds) for hosts that support haptics.
    pub fn vibration_pattern(&self) -> &'static [u64] {
        match self {
            FeedbackCue::Detected => &[40],
            FeedbackCue::Success => &[60, 40, 60],
            FeedbackCue::Warning => &[150],
            FeedbackCue::Error => &[200, 80, 200],
        }
    }
}

/// Plays cues. Implementations must not block the caller.
pub trait Feedback: Send + Sync {
    fn play(&self, cue: FeedbackCue);
}

/// Silent feedback for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFeedback;

impl Feedback for NullFeedback {
    fn play(&self, _cue: FeedbackCue) {}
}
