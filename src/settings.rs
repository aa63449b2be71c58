use std::time::Duration;
use std::{fs, path::PathBuf, sync::Arc, sync::RwLock};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::capture::Facing;
use crate::config::ScanConfig;
use crate::feedback::{Feedback, NullFeedback};
use crate::validator::DEFAULT_MIN_LENGTH;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackSettings {
    pub sound_enabled: bool,
    pub haptics_enabled: bool,
    pub volume: f32,
}

impl FeedbackSettings {
    /// The cue player these settings ask for. Sound falls back to silence
    /// when the crate is built without `audio`.
    pub fn build_feedback(&self) -> Arc<dyn Feedback> {
        if !self.sound_enabled {
            return Arc::new(NullFeedback);
        }

        #[cfg(feature = "audio")]
        {
            Arc::new(crate::feedback::AudioFeedback::new(self.volume))
        }
        #[cfg(not(feature = "audio"))]
        {
            warn!("sound cues requested but audio support is not compiled in");
            Arc::new(NullFeedback)
        }
    }
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            haptics_enabled: true,
            volume: 0.6,
        }
    }
}

/// User-adjustable scanner tuning as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    pub required_detections: u32,
    pub sample_rate_hz: f32,
    pub facing: Facing,
    pub min_confidence: Option<f32>,
    pub min_code_length: usize,
    pub static_frame_threshold: Option<u32>,
    pub feedback: FeedbackSettings,
}

impl Default for ScanSettings {
    fn default() -> Self {
        let config = ScanConfig::default();
        Self {
            required_detections: config.required_detections,
            sample_rate_hz: 10.0,
            facing: config.facing,
            min_confidence: config.min_confidence,
            min_code_length: DEFAULT_MIN_LENGTH,
            static_frame_threshold: config.static_frame_threshold,
            feedback: FeedbackSettings::default(),
        }
    }
}

impl ScanSettings {
    pub fn to_config(&self) -> ScanConfig {
        ScanConfig {
            facing: self.facing,
            min_confidence: self.min_confidence,
            min_code_length: self.min_code_length,
            static_frame_threshold: self.static_frame_threshold,
            haptics: self.feedback.haptics_enabled,
            ..ScanConfig::default()
        }
        .with_required_detections(self.required_detections)
        .with_sample_rate(self.sample_rate_hz)
    }

    pub fn sample_interval(&self) -> Duration {
        self.to_config().sample_interval
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ScanSettings>,
}

impl SettingsStore {
    /// Load settings from `path`. A missing file yields defaults; an
    /// unreadable one is logged and replaced by defaults on the next save.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("ignoring corrupt settings file {}: {err}", path.display());
                ScanSettings::default()
            })
        } else {
            ScanSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn scan(&self) -> ScanSettings {
        self.data
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn update_scan(&self, settings: ScanSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &ScanSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: ScanSettings = serde_json::from_str(&contents)?;
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("parcel-scan-settings-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let store = SettingsStore::new(scratch_path("settings.json")).unwrap();
        assert_eq!(store.scan(), ScanSettings::default());
        assert_eq!(store.scan().to_config().required_detections, 3);
        assert!(store.scan().to_config().haptics);
    }

    #[test]
    fn updates_persist_across_instances() {
        let path = scratch_path("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.scan();
        settings.required_detections = 2;
        settings.feedback.sound_enabled = false;
        settings.feedback.haptics_enabled = false;
        store.update_scan(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reopened.scan(), settings);
        assert_eq!(reopened.scan().to_config().required_detections, 2);
        assert!(!reopened.scan().to_config().haptics);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn muted_feedback_is_silent() {
        let muted = FeedbackSettings {
            sound_enabled: false,
            ..FeedbackSettings::default()
        };
        muted
            .build_feedback()
            .play(crate::feedback::FeedbackCue::Success);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let path = scratch_path("settings.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.scan(), ScanSettings::default());
        assert!(store.reload().is_err());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let path = scratch_path("settings.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{ "requiredDetections": 2, "sampleRateHz": 40.0 }"#).unwrap();

        let settings = SettingsStore::new(path.clone()).unwrap().scan();
        assert_eq!(settings.required_detections, 2);
        assert_eq!(settings.feedback, FeedbackSettings::default());
        assert_eq!(
            settings.sample_interval(),
            crate::scheduler::MIN_SAMPLE_INTERVAL
        );

        fs::write(
            &path,
            r#"{ "requiredDetections": 2, "feedback": { "soundEnabled": false } }"#,
        )
        .unwrap();
        let settings = SettingsStore::new(path.clone()).unwrap().scan();
        assert_eq!(settings.required_detections, 2);
        assert!(!settings.feedback.sound_enabled);
        assert!(settings.feedback.haptics_enabled);
        assert_eq!(settings.feedback.volume, FeedbackSettings::default().volume);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
