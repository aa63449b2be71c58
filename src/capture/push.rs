//! A capture source fed by the host UI.
//!
//! Webview and mobile shells own the real camera; they push frames into a
//! latest-value slot through a [`FrameFeeder`]. The slot never queues, so a
//! slow decode simply misses the frames pushed in the meantime.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use image::GrayImage;
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::error::ScanError;

use super::{CaptureSource, Facing, Frame, FrameStream};

/// What the host reports about camera access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    PermissionDenied,
    NoDevice,
}

#[derive(Debug, Clone)]
enum FrameSlot {
    Empty,
    Frame(Arc<Frame>),
    Ended(String),
}

#[derive(Debug)]
struct Shared {
    availability: Availability,
    lease: Option<u64>,
    next_lease: u64,
    requested_facing: Option<Facing>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PushCamera {
    shared: Arc<Mutex<Shared>>,
    slot: Arc<watch::Sender<FrameSlot>>,
}

impl PushCamera {
    /// Create the camera and the feeder the host pushes frames through.
    pub fn new() -> (Arc<Self>, FrameFeeder) {
        let (slot, _) = watch::channel(FrameSlot::Empty);
        let slot = Arc::new(slot);
        let shared = Arc::new(Mutex::new(Shared {
            availability: Availability::Available,
            lease: None,
            next_lease: 1,
            requested_facing: None,
        }));

        let camera = Arc::new(Self {
            shared: Arc::clone(&shared),
            slot: Arc::clone(&slot),
        });
        let feeder = FrameFeeder {
            shared,
            slot,
            sequence: Arc::new(AtomicU64::new(0)),
        };
        (camera, feeder)
    }

    /// Facing requested by the most recent acquisition.
    pub fn requested_facing(&self) -> Option<Facing> {
        lock(&self.shared).requested_facing
    }
}

impl CaptureSource for PushCamera {
    fn acquire(&self, facing: Facing) -> Result<Box<dyn FrameStream>, ScanError> {
        let mut shared = lock(&self.shared);
        shared.requested_facing = Some(facing);

        match shared.availability {
            Availability::Available => {}
            Availability::PermissionDenied => return Err(ScanError::PermissionDenied),
            Availability::NoDevice => return Err(ScanError::DeviceNotFound),
        }

        if shared.lease.is_some() {
            return Err(ScanError::DeviceBusy);
        }

        let lease = shared.next_lease;
        shared.next_lease += 1;
        shared.lease = Some(lease);

        // Frames left over from an earlier lease are not delivered.
        self.slot.send_replace(FrameSlot::Empty);
        let frames = self.slot.subscribe();

        info!("camera lease {lease} acquired ({facing:?})");
        Ok(Box::new(PushStream {
            lease,
            frames,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn release(&self) {
        let mut shared = lock(&self.shared);
        if let Some(lease) = shared.lease.take() {
            info!("camera lease {lease} released");
        }
    }

    fn is_held(&self) -> bool {
        lock(&self.shared).lease.is_some()
    }
}

/// Host-side handle for pushing frames and reporting device changes.
#[derive(Clone)]
pub struct FrameFeeder {
    shared: Arc<Mutex<Shared>>,
    slot: Arc<watch::Sender<FrameSlot>>,
    sequence: Arc<AtomicU64>,
}

impl FrameFeeder {
    /// Publish a frame, replacing any frame not yet sampled.
    pub fn push(&self, image: GrayImage) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.slot
            .send_replace(FrameSlot::Frame(Arc::new(Frame::new(image, sequence))));
        sequence
    }

    pub fn push_frame(&self, frame: Frame) {
        self.slot.send_replace(FrameSlot::Frame(Arc::new(frame)));
    }

    pub fn set_availability(&self, availability: Availability) {
        debug!("camera availability now {availability:?}");
        lock(&self.shared).availability = availability;
    }

    /// The live track ended (tab hidden, track stopped, OS revoked access).
    ///
    /// The lease is dropped here, so the device reads as free before the
    /// scan loop next samples.
    pub fn interrupt(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("camera stream interrupted: {reason}");
        {
            let mut shared = lock(&self.shared);
            if let Some(lease) = shared.lease.take() {
                info!("camera lease {lease} dropped by interruption");
            }
        }
        self.slot.send_replace(FrameSlot::Ended(reason));
    }

    /// The device went away entirely.
    pub fn disconnect(&self) {
        self.set_availability(Availability::NoDevice);
        self.interrupt("camera device disconnected");
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.shared).lease.is_some()
    }
}

struct PushStream {
    lease: u64,
    frames: watch::Receiver<FrameSlot>,
    shared: Arc<Mutex<Shared>>,
}

impl FrameStream for PushStream {
    fn latest_frame(&mut self) -> Result<Option<Arc<Frame>>, ScanError> {
        if let FrameSlot::Ended(reason) = &*self.frames.borrow() {
            return Err(ScanError::StreamInterrupted(reason.clone()));
        }
        if lock(&self.shared).lease != Some(self.lease) {
            return Err(ScanError::StreamInterrupted("camera lease revoked".into()));
        }

        match self.frames.has_changed() {
            Ok(false) => return Ok(None),
            Ok(true) => {}
            Err(_) => return Err(ScanError::StreamInterrupted("frame source closed".into())),
        }

        let slot = self.frames.borrow_and_update().clone();
        match slot {
            FrameSlot::Empty => Ok(None),
            FrameSlot::Frame(frame) => Ok(Some(frame)),
            FrameSlot::Ended(reason) => Err(ScanError::StreamInterrupted(reason)),
        }
    }
}

impl Drop for PushStream {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        if shared.lease == Some(self.lease) {
            shared.lease = None;
            debug!("camera lease {} released by stream drop", self.lease);
        }
    }
}
