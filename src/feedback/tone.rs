use std::f32::consts::PI;
use std::time::Duration;

use super::FeedbackCue;

const SAMPLE_RATE: u32 = 44100;
const AMPLITUDE: f32 = 0.2;
/// Linear fade at each segment edge to avoid clicks.
const FADE_SAMPLES: usize = 220;

/// Mono sine-segment generator for one cue.
pub struct CueTone {
    segments: &'static [(f32, u32)],
    segment: usize,
    sample_in_segment: usize,
    volume: f32,
}

impl CueTone {
    pub fn new(cue: FeedbackCue, volume: f32) -> Self {
        Self {
            segments: cue.segments(),
            segment: 0,
            sample_in_segment: 0,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn duration(&self) -> Duration {
        let total_ms: u32 = self.segments.iter().map(|(_, ms)| ms).sum();
        Duration::from_millis(u64::from(total_ms))
    }

    fn segment_len(duration_ms: u32) -> usize {
        (SAMPLE_RATE as usize * duration_ms as usize) / 1000
    }
}

impl Iterator for CueTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (frequency, duration_ms) = *self.segments.get(self.segment)?;
            let len = Self::segment_len(duration_ms);
            if self.sample_in_segment >= len {
                self.segment += 1;
                self.sample_in_segment = 0;
                continue;
            }

            let n = self.sample_in_segment;
            self.sample_in_segment += 1;

            if frequency <= 0.0 {
                return Some(0.0);
            }

            let t = n as f32 / SAMPLE_RATE as f32;
            let edge = n.min(len - 1 - n).min(FADE_SAMPLES);
            let envelope = edge as f32 / FADE_SAMPLES as f32;
            return Some((2.0 * PI * frequency * t).sin() * AMPLITUDE * envelope * self.volume);
        }
    }
}

#[cfg(feature = "audio")]
impl rodio::Source for CueTone {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_length_matches_segments() {
        let tone = CueTone::new(FeedbackCue::Success, 1.0);
        let expected = CueTone::segment_len(90) + CueTone::segment_len(30) + CueTone::segment_len(120);
        assert_eq!(tone.duration(), Duration::from_millis(240));
        assert_eq!(CueTone::new(FeedbackCue::Success, 1.0).count(), expected);
    }

    #[test]
    fn samples_stay_within_amplitude_and_fade_in() {
        let samples: Vec<f32> = CueTone::new(FeedbackCue::Error, 1.0).collect();
        assert_eq!(samples[0], 0.0);
        assert!(samples.iter().all(|s| s.abs() <= AMPLITUDE));
        assert!(samples.iter().any(|s| s.abs() > AMPLITUDE / 2.0));
    }

    #[test]
    fn gaps_are_silent_and_volume_scales() {
        let gap_start = CueTone::segment_len(150);
        let samples: Vec<f32> = CueTone::new(FeedbackCue::Error, 1.0).collect();
        let gap = &samples[gap_start..gap_start + CueTone::segment_len(40)];
        assert!(gap.iter().all(|s| *s == 0.0));

        assert!(CueTone::new(FeedbackCue::Warning, 0.0).all(|s| s == 0.0));
    }
}
