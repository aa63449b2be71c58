//! Pulls email-derived orders into the purchase store.

use std::collections::HashSet;
use std::future::Future;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::db::{Database, UpsertOutcome};
use crate::models::PurchaseInput;

/// Upper bound on pages pulled in one sync.
pub const DEFAULT_MAX_PAGES: usize = 20;

/// One page of orders parsed out of the user's mailbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailBatch {
    pub records: Vec<PurchaseInput>,
    pub next_page_token: Option<String>,
    pub has_more: bool,
}

/// A paginated feed of order emails.
pub trait OrderEmailSource: Send + Sync {
    fn fetch_batch(
        &self,
        page_token: Option<String>,
    ) -> impl Future<Output = Result<EmailBatch>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// The source said there is nothing more.
    Exhausted,
    /// More was promised but no token came with it.
    MissingToken,
    /// The source handed back a token it already gave us.
    RepeatedToken,
    PageLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pages: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Records the store refused (missing message id, blank product).
    pub skipped: usize,
    pub stopped: StopReason,
}

/// Drain `source` into `db` for `owner_id`, one page at a time.
///
/// A failed fetch aborts the sync; records already written stay written.
pub async fn sync_email_orders<S>(
    source: &S,
    db: &Database,
    owner_id: &str,
    max_pages: usize,
) -> Result<SyncReport>
where
    S: OrderEmailSource,
{
    let mut report = SyncReport {
        pages: 0,
        inserted: 0,
        updated: 0,
        skipped: 0,
        stopped: StopReason::PageLimit,
    };
    let mut seen_tokens = HashSet::new();
    let mut page_token: Option<String> = None;

    while report.pages < max_pages.max(1) {
        let batch = source
            .fetch_batch(page_token.clone())
            .await
            .with_context(|| format!("failed to fetch email page {}", report.pages + 1))?;
        report.pages += 1;

        for record in batch.records {
            match db.upsert_email_purchase(owner_id, record).await {
                Ok(UpsertOutcome::Inserted(_)) => report.inserted += 1,
                Ok(UpsertOutcome::Updated(_)) => report.updated += 1,
                Err(err) => {
                    warn!("skipping email order for {owner_id}: {err:#}");
                    report.skipped += 1;
                }
            }
        }

        if !batch.has_more {
            report.stopped = StopReason::Exhausted;
            break;
        }
        let Some(token) = batch.next_page_token else {
            warn!("email source reported more pages without a page token");
            report.stopped = StopReason::MissingToken;
            break;
        };
        if !seen_tokens.insert(token.clone()) {
            warn!("email source repeated page token {token}");
            report.stopped = StopReason::RepeatedToken;
            break;
        }
        page_token = Some(token);
    }

    info!(
        "email sync for {owner_id}: {} pages, {} new, {} updated, {} skipped ({:?})",
        report.pages, report.inserted, report.updated, report.skipped, report.stopped
    );
    Ok(report)
}
