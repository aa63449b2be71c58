//! Repeated-sighting consensus over noisy per-frame decodes.
//!
//! A code is only trusted after the exact same string has been read
//! `required` times within the session. Sightings need not be consecutive, so
//! a stray misread of a neighbouring label does not reset progress on the
//! real one. Every competing string is counted independently and all counts
//! are dropped as soon as one of them confirms.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::DecodedCandidate;

/// Progress for one candidate after a sighting has been counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub code: String,
    pub count: u32,
    pub required: u32,
    pub confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct ConsensusFilter {
    required: u32,
    min_confidence: Option<f32>,
    counts: HashMap<String, u32>,
}

impl ConsensusFilter {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            min_confidence: None,
            counts: HashMap::new(),
        }
    }

    /// Discard candidates whose reported confidence is below `min`.
    /// Candidates without a confidence value are always counted.
    pub fn with_min_confidence(mut self, min: Option<f32>) -> Self {
        self.min_confidence = min;
        self
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    /// Count one sighting. Returns `None` when the candidate is discarded.
    pub fn observe(&mut self, candidate: &DecodedCandidate) -> Option<Detection> {
        if !self.accepts(candidate) {
            return None;
        }

        let count = self
            .counts
            .entry(candidate.raw_text.clone())
            .or_insert(0);
        *count += 1;
        let count = *count;

        let confirmed = count >= self.required;
        if confirmed {
            self.counts.clear();
        }

        Some(Detection {
            code: candidate.raw_text.clone(),
            count,
            required: self.required,
            confirmed,
        })
    }

    /// Current count for `code`, zero if unseen.
    pub fn count(&self, code: &str) -> u32 {
        self.counts.get(code).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Snapshot of the in-progress counts, highest first.
    pub fn progress(&self) -> Vec<(String, u32)> {
        let mut entries: Vec<(String, u32)> = self
            .counts
            .iter()
            .map(|(code, count)| (code.clone(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    fn accepts(&self, candidate: &DecodedCandidate) -> bool {
        let text = candidate.raw_text.as_str();
        if text.trim().is_empty() || text.chars().any(char::is_control) {
            return false;
        }

        match (self.min_confidence, candidate.frame_confidence) {
            (Some(min), Some(confidence)) => confidence >= min,
            _ => true,
        }
    }
}
