//! Camera ownership and frame delivery.
//!
//! A [`CaptureSource`] hands out at most one [`FrameStream`] at a time. The
//! stream owns the device lease: dropping it releases the device, and it only
//! ever releases its own lease, so a stale stream cannot free a newer
//! session's camera.

pub mod push;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

pub use push::{Availability, FrameFeeder, PushCamera};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Facing {
    /// Rear camera; the default for pointing at a parcel.
    #[default]
    Environment,
    User,
}

/// One 8-bit luma video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: GrayImage,
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: GrayImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Utc::now(),
        }
    }

    /// Wrap tightly packed luma bytes.
    pub fn from_luma(width: u32, height: u32, luma: Vec<u8>, sequence: u64) -> Result<Self> {
        let expected = width as usize * height as usize;
        let actual = luma.len();
        let image = GrayImage::from_raw(width, height, luma).ok_or_else(|| {
            anyhow!("luma buffer holds {actual} bytes, {width}x{height} needs {expected}")
        })?;
        Ok(Self::new(image, sequence))
    }

    /// Decode a PNG/JPEG still (e.g. a webview canvas capture) to luma.
    pub fn from_encoded(bytes: &[u8], sequence: u64) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).context("failed to decode frame image")?;
        Ok(Self::new(decoded.to_luma8(), sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Live frames from an acquired device.
pub trait FrameStream: Send {
    /// The newest frame not yet returned, if any.
    ///
    /// Frames are never queued: a frame overwritten before it was sampled is
    /// lost. Fails with [`ScanError::StreamInterrupted`] once the stream has
    /// ended for any reason.
    fn latest_frame(&mut self) -> Result<Option<Arc<Frame>>, ScanError>;
}

/// Physical camera access.
pub trait CaptureSource: Send + Sync {
    /// Acquire the device. May block while the user answers a permission prompt.
    fn acquire(&self, facing: Facing) -> Result<Box<dyn FrameStream>, ScanError>;

    /// Release whatever lease is held. Idempotent, and safe when nothing was
    /// ever acquired.
    fn release(&self);

    /// Whether a lease is currently outstanding.
    fn is_held(&self) -> bool;
}
