use std::sync::{Mutex, PoisonError};

use image::{DynamicImage, GrayImage};
use image_hasher::{HashAlg, HasherConfig, ImageHash};

/// Skips frames that look the same as the last frame with nothing readable.
///
/// A parked camera pointed at an empty desk produces near-identical frames;
/// hashing them is far cheaper than running the engine on each.
pub struct StaticFrameGate {
    max_distance: u32,
    last_empty: Mutex<Option<ImageHash>>,
}

impl StaticFrameGate {
    pub fn new(max_distance: u32) -> Self {
        Self {
            max_distance,
            last_empty: Mutex::new(None),
        }
    }

    pub fn fingerprint(image: &GrayImage) -> ImageHash {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::DoubleGradient)
            .hash_size(8, 8)
            .to_hasher();
        hasher.hash_image(&DynamicImage::ImageLuma8(image.clone()))
    }

    /// Whether `hash` is within the distance threshold of the last empty frame.
    pub fn is_unchanged(&self, hash: &ImageHash) -> bool {
        let guard = self.last_empty.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map(|previous| previous.dist(hash) <= self.max_distance)
            .unwrap_or(false)
    }

    pub fn remember_empty(&self, hash: ImageHash) {
        *self.last_empty.lock().unwrap_or_else(PoisonError::into_inner) = Some(hash);
    }

    pub fn forget(&self) {
        *self.last_empty.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn stripes(offset: u32) -> GrayImage {
        GrayImage::from_fn(64, 64, |x, _| {
            if ((x + offset) / 8) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    fn gradient() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| Luma([((x * 2 + y) % 256) as u8]))
    }

    #[test]
    fn identical_frame_is_unchanged() {
        let gate = StaticFrameGate::new(4);
        let hash = StaticFrameGate::fingerprint(&stripes(0));
        assert!(!gate.is_unchanged(&hash));

        gate.remember_empty(hash.clone());
        assert!(gate.is_unchanged(&StaticFrameGate::fingerprint(&stripes(0))));

        gate.forget();
        assert!(!gate.is_unchanged(&hash));
    }

    #[test]
    fn different_scene_passes_the_gate() {
        let gate = StaticFrameGate::new(0);
        gate.remember_empty(StaticFrameGate::fingerprint(&stripes(0)));
        assert!(!gate.is_unchanged(&StaticFrameGate::fingerprint(&gradient())));
    }
}
