use std::time::Duration;

use crate::capture::Facing;
use crate::scheduler::{MAX_SAMPLE_INTERVAL, MIN_SAMPLE_INTERVAL};
use crate::validator::DEFAULT_MIN_LENGTH;

/// Tunables for one scanner.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Identical reads needed before a code is trusted. The two scanner
    /// screens historically used 2 and 3; 3 is the stricter default.
    pub required_detections: u32,

    /// Frame sampling period, kept within 5-15 samples per second.
    pub sample_interval: Duration,

    pub facing: Facing,

    /// Reads reporting a confidence below this are ignored.
    pub min_confidence: Option<f32>,

    /// Validator length floor.
    pub min_code_length: usize,

    /// Perceptual-hash distance under which a frame counts as unchanged.
    /// `None` disables the static-frame gate.
    pub static_frame_threshold: Option<u32>,

    /// Forward vibration patterns to the host with each cue.
    pub haptics: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            required_detections: 3,
            sample_interval: Duration::from_millis(100),
            facing: Facing::Environment,
            min_confidence: None,
            min_code_length: DEFAULT_MIN_LENGTH,
            static_frame_threshold: None,
            haptics: true,
        }
    }
}

impl ScanConfig {
    pub fn with_required_detections(mut self, required: u32) -> Self {
        self.required_detections = required.max(1);
        self
    }

    /// Sampling rate in Hz, clamped to the supported band.
    pub fn with_sample_rate(mut self, hz: f32) -> Self {
        let period = if hz > 0.0 {
            Duration::from_micros((1_000_000.0 / f64::from(hz)).round() as u64)
        } else {
            MAX_SAMPLE_INTERVAL
        };
        self.sample_interval = period.clamp(MIN_SAMPLE_INTERVAL, MAX_SAMPLE_INTERVAL);
        self
    }
}
