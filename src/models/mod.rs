pub mod candidate;
pub mod purchase;

pub use candidate::{DecodedCandidate, Symbology};
pub use purchase::{PurchaseInput, PurchaseRecord, PurchaseSource};
