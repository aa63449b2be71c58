pub mod controller;
pub mod events;
mod loop_worker;
pub mod state;

pub use controller::{ScanController, ScanControllerBuilder};
pub use events::{event_channel, EventSink, ScanEvent};
pub use state::{Confirmation, Resolution, ScanSession, ScanSnapshot, ScanState};
