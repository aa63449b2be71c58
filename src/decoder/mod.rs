//! Per-frame barcode decoding.
//!
//! The symbol math lives in an external engine behind [`DecodeEngine`]; this
//! module is the only place that talks to it. Everything downstream sees
//! [`DecodeOutcome`] and [`DecodedCandidate`] only, so engines can be swapped
//! without touching consensus, validation or matching.

pub mod frame_gate;

use std::collections::HashSet;
use std::sync::Arc;

use image::GrayImage;
use log::debug;

use crate::capture::Frame;
use crate::error::ScanError;
use crate::models::{DecodedCandidate, Symbology};

pub use frame_gate::StaticFrameGate;

/// An external barcode reader.
pub trait DecodeEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Look for one readable symbol. `Ok(None)` is the normal "nothing here".
    fn decode(&self, image: &GrayImage) -> anyhow::Result<Option<DecodedCandidate>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Found(DecodedCandidate),
    NotFound,
    /// Skipped by the static-frame gate; treat like `NotFound`.
    Unchanged,
}

#[derive(Clone)]
pub struct Decoder {
    engine: Arc<dyn DecodeEngine>,
    symbologies: Arc<HashSet<Symbology>>,
    gate: Option<Arc<StaticFrameGate>>,
}

impl Decoder {
    pub fn new(engine: Arc<dyn DecodeEngine>) -> Self {
        Self {
            engine,
            symbologies: Arc::new(Symbology::PACKAGE_SET.into_iter().collect()),
            gate: None,
        }
    }

    /// Restrict accepted symbologies. Reads in any other symbology are
    /// reported as `NotFound`.
    pub fn with_symbologies(mut self, symbologies: impl IntoIterator<Item = Symbology>) -> Self {
        self.symbologies = Arc::new(symbologies.into_iter().collect());
        self
    }

    /// Skip frames within `max_distance` (perceptual-hash bits) of the last
    /// frame that decoded to nothing.
    pub fn with_static_frame_gate(mut self, max_distance: Option<u32>) -> Self {
        self.gate = max_distance.map(|distance| Arc::new(StaticFrameGate::new(distance)));
        self
    }

    /// Drop the remembered empty frame so the next frame is always decoded.
    pub fn clear_static_frame(&self) {
        if let Some(gate) = &self.gate {
            gate.forget();
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Decode one frame on the blocking pool.
    pub async fn decode(&self, frame: Arc<Frame>) -> Result<DecodeOutcome, ScanError> {
        let decoder = self.clone();
        tokio::task::spawn_blocking(move || decoder.decode_blocking(&frame))
            .await
            .map_err(|err| ScanError::DecodeEngineUnavailable(format!("decode worker failed: {err}")))?
    }

    pub fn decode_blocking(&self, frame: &Frame) -> Result<DecodeOutcome, ScanError> {
        let fingerprint = match &self.gate {
            Some(gate) => {
                let hash = StaticFrameGate::fingerprint(&frame.image);
                if gate.is_unchanged(&hash) {
                    return Ok(DecodeOutcome::Unchanged);
                }
                Some(hash)
            }
            None => None,
        };

        let result = self.engine.decode(&frame.image).map_err(|err| {
            ScanError::DecodeEngineUnavailable(format!("{}: {err:#}", self.engine.name()))
        })?;

        match result {
            Some(candidate) if self.symbologies.contains(&candidate.symbology) => {
                if let Some(gate) = &self.gate {
                    gate.forget();
                }
                Ok(DecodeOutcome::Found(candidate))
            }
            Some(candidate) => {
                debug!(
                    "ignoring {:?} read on frame {} (symbology not enabled)",
                    candidate.symbology, frame.sequence
                );
                Ok(DecodeOutcome::NotFound)
            }
            None => {
                if let (Some(gate), Some(hash)) = (&self.gate, fingerprint) {
                    gate.remember_empty(hash);
                }
                Ok(DecodeOutcome::NotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;

    struct FixedEngine {
        result: Option<DecodedCandidate>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedEngine {
        fn returning(result: Option<DecodedCandidate>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }
    }

    impl DecodeEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        fn decode(&self, _image: &GrayImage) -> anyhow::Result<Option<DecodedCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("license expired"));
            }
            Ok(self.result.clone())
        }
    }

    fn frame() -> Arc<Frame> {
        Arc::new(Frame::new(GrayImage::new(32, 32), 1))
    }

    #[tokio::test]
    async fn found_candidate_passes_through() {
        let candidate = DecodedCandidate::new("123456789012", Symbology::UpcA);
        let decoder = Decoder::new(FixedEngine::returning(Some(candidate.clone())));

        assert_eq!(
            decoder.decode(frame()).await.unwrap(),
            DecodeOutcome::Found(candidate)
        );
    }

    #[tokio::test]
    async fn nothing_readable_is_not_an_error() {
        let decoder = Decoder::new(FixedEngine::returning(None));
        assert_eq!(decoder.decode(frame()).await.unwrap(), DecodeOutcome::NotFound);
    }

    #[tokio::test]
    async fn disabled_symbology_is_not_found() {
        let engine = FixedEngine::returning(Some(DecodedCandidate::new(
            "https://example.com",
            Symbology::Other("QR_CODE".into()),
        )));
        let decoder = Decoder::new(engine);
        assert_eq!(decoder.decode(frame()).await.unwrap(), DecodeOutcome::NotFound);

        let code39_only = Decoder::new(FixedEngine::returning(Some(DecodedCandidate::new(
            "123456789012",
            Symbology::UpcA,
        ))))
        .with_symbologies([Symbology::Code39]);
        assert_eq!(
            code39_only.decode(frame()).await.unwrap(),
            DecodeOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn engine_failure_is_classified() {
        let engine = Arc::new(FixedEngine {
            result: None,
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let err = Decoder::new(engine).decode(frame()).await.unwrap_err();
        match err {
            ScanError::DecodeEngineUnavailable(message) => {
                assert!(message.contains("license expired"))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn static_gate_skips_repeated_empty_frames() {
        let engine = FixedEngine::returning(None);
        let decoder = Decoder::new(engine.clone()).with_static_frame_gate(Some(2));

        assert_eq!(decoder.decode(frame()).await.unwrap(), DecodeOutcome::NotFound);
        assert_eq!(decoder.decode(frame()).await.unwrap(), DecodeOutcome::Unchanged);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cleared_gate_decodes_the_same_frame_again() {
        let engine = FixedEngine::returning(None);
        let decoder = Decoder::new(engine.clone()).with_static_frame_gate(Some(2));

        assert_eq!(decoder.decode(frame()).await.unwrap(), DecodeOutcome::NotFound);
        decoder.clear_static_frame();
        assert_eq!(decoder.decode(frame()).await.unwrap(), DecodeOutcome::NotFound);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }
}
