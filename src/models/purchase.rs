//! Purchase records as the scanner and the store see them.
//!
//! The matcher only reads `tracking_number`; everything else is payload
//! handed back to the caller on a match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PurchaseSource {
    Manual,
    Email,
}

impl PurchaseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseSource::Manual => "Manual",
            PurchaseSource::Email => "Email",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: String,
    pub owner_id: String,
    pub product: String,
    pub order_number: Option<String>,
    /// Carrier tracking code as entered or ingested; formatting is arbitrary.
    pub tracking_number: Option<String>,
    pub status: Option<String>,
    pub source: PurchaseSource,
    /// Upstream id (e.g. an email message id) used to dedupe ingestion.
    pub external_id: Option<String>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating or replacing a purchase.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseInput {
    pub product: String,
    pub order_number: Option<String>,
    pub tracking_number: Option<String>,
    pub status: Option<String>,
    pub external_id: Option<String>,
    pub purchased_at: Option<DateTime<Utc>>,
}

impl PurchaseRecord {
    /// Build a fresh manual record for `owner_id`.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, input: PurchaseInput) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            product: input.product,
            order_number: input.order_number,
            tracking_number: input.tracking_number,
            status: input.status,
            source: PurchaseSource::Manual,
            external_id: input.external_id,
            purchased_at: input.purchased_at,
            created_at: now,
            updated_at: now,
        }
    }
}
