use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{clean_optional, parse_datetime, parse_optional_datetime, parse_source},
};
use crate::models::{PurchaseInput, PurchaseRecord, PurchaseSource};

const PURCHASE_COLUMNS: &str = "id, owner_id, product, order_number, tracking_number, status, \
     source, external_id, purchased_at, created_at, updated_at";

/// Whether an ingested purchase created a row or refreshed an existing one.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted(PurchaseRecord),
    Updated(PurchaseRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &PurchaseRecord {
        match self {
            UpsertOutcome::Inserted(record) | UpsertOutcome::Updated(record) => record,
        }
    }
}

fn row_to_purchase(row: &Row) -> Result<PurchaseRecord> {
    let source: String = row.get("source")?;
    let purchased_at: Option<String> = row.get("purchased_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(PurchaseRecord {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        product: row.get("product")?,
        order_number: row.get("order_number")?,
        tracking_number: row.get("tracking_number")?,
        status: row.get("status")?,
        source: parse_source(&source)?,
        external_id: row.get("external_id")?,
        purchased_at: parse_optional_datetime(purchased_at, "purchased_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn fetch_purchase(conn: &Connection, purchase_id: &str) -> Result<Option<PurchaseRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![purchase_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_purchase(row)?)),
        None => Ok(None),
    }
}

fn clean_input(input: PurchaseInput) -> Result<PurchaseInput> {
    let product = input.product.trim().to_string();
    if product.is_empty() {
        bail!("purchase product must not be empty");
    }

    Ok(PurchaseInput {
        product,
        order_number: clean_optional(input.order_number),
        tracking_number: clean_optional(input.tracking_number),
        status: clean_optional(input.status),
        external_id: clean_optional(input.external_id),
        purchased_at: input.purchased_at,
    })
}

fn insert_purchase(
    conn: &Connection,
    owner_id: &str,
    source: PurchaseSource,
    input: PurchaseInput,
) -> Result<PurchaseRecord> {
    let now = Utc::now();
    let record = PurchaseRecord {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        product: input.product,
        order_number: input.order_number,
        tracking_number: input.tracking_number,
        status: input.status,
        source,
        external_id: input.external_id,
        purchased_at: input.purchased_at,
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO purchases (id, owner_id, product, order_number, tracking_number, status,
                                source, external_id, purchased_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.id,
            record.owner_id,
            record.product,
            record.order_number,
            record.tracking_number,
            record.status,
            record.source.as_str(),
            record.external_id,
            record.purchased_at.map(|dt| dt.to_rfc3339()),
            record.created_at.to_rfc3339(),
            record.updated_at.to_rfc3339(),
        ],
    )
    .with_context(|| "failed to insert purchase")?;

    Ok(record)
}

impl Database {
    /// All purchases for `owner_id`, newest first.
    pub async fn list_purchases_by_owner(&self, owner_id: &str) -> Result<Vec<PurchaseRecord>> {
        let owner_id = owner_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PURCHASE_COLUMNS}
                 FROM purchases
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, id ASC"
            ))?;

            let mut rows = stmt.query(params![owner_id])?;
            let mut purchases = Vec::new();
            while let Some(row) = rows.next()? {
                purchases.push(row_to_purchase(row)?);
            }

            Ok(purchases)
        })
        .await
    }

    pub async fn get_purchase(&self, purchase_id: &str) -> Result<Option<PurchaseRecord>> {
        let purchase_id = purchase_id.to_string();
        self.execute(move |conn| fetch_purchase(conn, &purchase_id))
            .await
    }

    /// Record a purchase entered by hand.
    pub async fn create_purchase(
        &self,
        owner_id: &str,
        input: PurchaseInput,
    ) -> Result<PurchaseRecord> {
        let owner_id = owner_id.to_string();
        self.execute(move |conn| {
            let input = clean_input(input)?;
            insert_purchase(conn, &owner_id, PurchaseSource::Manual, input)
        })
        .await
    }

    /// Replace the editable fields of a purchase. Source, owner and creation
    /// time are kept.
    pub async fn update_purchase(
        &self,
        purchase_id: &str,
        input: PurchaseInput,
    ) -> Result<PurchaseRecord> {
        let purchase_id = purchase_id.to_string();
        self.execute(move |conn| {
            let input = clean_input(input)?;
            let changed = conn
                .execute(
                    "UPDATE purchases
                     SET product = ?1,
                         order_number = ?2,
                         tracking_number = ?3,
                         status = ?4,
                         external_id = ?5,
                         purchased_at = ?6,
                         updated_at = ?7
                     WHERE id = ?8",
                    params![
                        input.product,
                        input.order_number,
                        input.tracking_number,
                        input.status,
                        input.external_id,
                        input.purchased_at.map(|dt| dt.to_rfc3339()),
                        Utc::now().to_rfc3339(),
                        purchase_id,
                    ],
                )
                .with_context(|| "failed to update purchase")?;
            if changed == 0 {
                bail!("purchase {purchase_id} not found");
            }

            fetch_purchase(conn, &purchase_id)?
                .ok_or_else(|| anyhow!("purchase {purchase_id} not found after update"))
        })
        .await
    }

    /// Returns `false` when there was nothing to delete.
    pub async fn delete_purchase(&self, purchase_id: &str) -> Result<bool> {
        let purchase_id = purchase_id.to_string();
        self.execute(move |conn| {
            let deleted = conn
                .execute("DELETE FROM purchases WHERE id = ?1", params![purchase_id])
                .with_context(|| "failed to delete purchase")?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Attach a scanned code to a purchase, typically after a NoMatch.
    pub async fn link_tracking_number(
        &self,
        purchase_id: &str,
        tracking_number: &str,
    ) -> Result<PurchaseRecord> {
        let purchase_id = purchase_id.to_string();
        let tracking_number = tracking_number.trim().to_string();
        self.execute(move |conn| {
            if tracking_number.is_empty() {
                bail!("tracking number must not be empty");
            }

            let changed = conn
                .execute(
                    "UPDATE purchases SET tracking_number = ?1, updated_at = ?2 WHERE id = ?3",
                    params![tracking_number, Utc::now().to_rfc3339(), purchase_id],
                )
                .with_context(|| "failed to link tracking number")?;
            if changed == 0 {
                bail!("purchase {purchase_id} not found");
            }

            fetch_purchase(conn, &purchase_id)?
                .ok_or_else(|| anyhow!("purchase {purchase_id} not found after update"))
        })
        .await
    }

    /// Insert or refresh an email-derived purchase, keyed by the owner and
    /// the upstream message id. A tracking number already on the row is kept
    /// when the new email carries none.
    pub async fn upsert_email_purchase(
        &self,
        owner_id: &str,
        input: PurchaseInput,
    ) -> Result<UpsertOutcome> {
        let owner_id = owner_id.to_string();
        self.execute(move |conn| {
            let input = clean_input(input)?;
            let external_id = input
                .external_id
                .clone()
                .ok_or_else(|| anyhow!("email purchase has no external id"))?;

            let tx = conn
                .transaction()
                .context("failed to open upsert transaction")?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM purchases
                     WHERE owner_id = ?1 AND source = ?2 AND external_id = ?3",
                    params![owner_id, PurchaseSource::Email.as_str(), external_id],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match existing {
                Some(purchase_id) => {
                    tx.execute(
                        "UPDATE purchases
                         SET product = ?1,
                             order_number = COALESCE(?2, order_number),
                             tracking_number = COALESCE(?3, tracking_number),
                             status = COALESCE(?4, status),
                             purchased_at = COALESCE(?5, purchased_at),
                             updated_at = ?6
                         WHERE id = ?7",
                        params![
                            input.product,
                            input.order_number,
                            input.tracking_number,
                            input.status,
                            input.purchased_at.map(|dt| dt.to_rfc3339()),
                            Utc::now().to_rfc3339(),
                            purchase_id,
                        ],
                    )
                    .with_context(|| "failed to refresh email purchase")?;
                    let record = fetch_purchase(&tx, &purchase_id)?
                        .ok_or_else(|| anyhow!("purchase {purchase_id} vanished during upsert"))?;
                    UpsertOutcome::Updated(record)
                }
                None => UpsertOutcome::Inserted(insert_purchase(
                    &tx,
                    &owner_id,
                    PurchaseSource::Email,
                    input,
                )?),
            };

            tx.commit().context("failed to commit upsert")?;
            Ok(outcome)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_order;

    fn input(product: &str, tracking: Option<&str>) -> PurchaseInput {
        PurchaseInput {
            product: product.into(),
            tracking_number: tracking.map(str::to_string),
            ..PurchaseInput::default()
        }
    }

    fn email(message_id: &str, tracking: Option<&str>) -> PurchaseInput {
        PurchaseInput {
            external_id: Some(message_id.into()),
            order_number: Some("112-3344".into()),
            ..input("Trail Runners", tracking)
        }
    }

    #[tokio::test]
    async fn create_list_and_match() {
        let db = Database::in_memory().unwrap();
        let created = db
            .create_purchase("alice", input("Sneakers", Some("1Z 999 AA1 0123 4567 5")))
            .await
            .unwrap();
        db.create_purchase("bob", input("Lamp", Some("9400109699939926709875")))
            .await
            .unwrap();

        let mine = db.list_purchases_by_owner("alice").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0], created);
        assert_eq!(mine[0].source, PurchaseSource::Manual);

        let hit = match_order("1z999aa1012345675", &mine).unwrap();
        assert_eq!(hit.id, created.id);
    }

    #[tokio::test]
    async fn blank_fields_are_stored_as_null() {
        let db = Database::in_memory().unwrap();
        let created = db
            .create_purchase(
                "alice",
                PurchaseInput {
                    status: Some("   ".into()),
                    ..input("  Desk  ", Some(""))
                },
            )
            .await
            .unwrap();

        assert_eq!(created.product, "Desk");
        assert_eq!(created.tracking_number, None);
        assert_eq!(created.status, None);
        assert!(db.create_purchase("alice", input(" ", None)).await.is_err());
    }

    #[tokio::test]
    async fn update_link_and_delete() {
        let db = Database::in_memory().unwrap();
        let created = db
            .create_purchase("alice", input("Sneakers", None))
            .await
            .unwrap();

        let updated = db
            .update_purchase(
                &created.id,
                PurchaseInput {
                    status: Some("Shipped".into()),
                    ..input("Sneakers (blue)", None)
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.product, "Sneakers (blue)");
        assert_eq!(updated.created_at, created.created_at);

        let linked = db
            .link_tracking_number(&created.id, " 123456789012 ")
            .await
            .unwrap();
        assert_eq!(linked.tracking_number.as_deref(), Some("123456789012"));
        assert_eq!(linked.status.as_deref(), Some("Shipped"));

        assert!(db.delete_purchase(&created.id).await.unwrap());
        assert!(!db.delete_purchase(&created.id).await.unwrap());
        assert!(db.get_purchase(&created.id).await.unwrap().is_none());
        assert!(db.update_purchase(&created.id, input("Gone", None)).await.is_err());
        assert!(db.link_tracking_number(&created.id, "123456789012").await.is_err());
    }

    #[tokio::test]
    async fn email_upsert_dedupes_by_message_id() {
        let db = Database::in_memory().unwrap();

        let first = db
            .upsert_email_purchase("alice", email("msg-1", None))
            .await
            .unwrap();
        let UpsertOutcome::Inserted(inserted) = first else {
            panic!("expected insert");
        };
        assert_eq!(inserted.source, PurchaseSource::Email);

        let second = db
            .upsert_email_purchase("alice", email("msg-1", Some("1Z999AA1012345675")))
            .await
            .unwrap();
        assert_eq!(second.record().id, inserted.id);
        assert!(matches!(second, UpsertOutcome::Updated(_)));

        // A later email without tracking keeps what we already know.
        let third = db
            .upsert_email_purchase("alice", email("msg-1", None))
            .await
            .unwrap();
        assert_eq!(
            third.record().tracking_number.as_deref(),
            Some("1Z999AA1012345675")
        );

        // Same message id for another owner is a separate purchase.
        let other = db
            .upsert_email_purchase("bob", email("msg-1", None))
            .await
            .unwrap();
        assert!(matches!(other, UpsertOutcome::Inserted(_)));
        assert_eq!(db.list_purchases_by_owner("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn email_upsert_requires_message_id() {
        let db = Database::in_memory().unwrap();
        let err = db
            .upsert_email_purchase("alice", input("Mystery", None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("external id"));
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("parcel-scan-db-{}", Uuid::new_v4()));
        let path = dir.join("purchases.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            assert_eq!(db.path(), Some(path.as_path()));
            db.create_purchase("alice", input("Sneakers", Some("123456789012")))
                .await
                .unwrap();
        }

        let reopened = Database::new(path).unwrap();
        let purchases = reopened.list_purchases_by_owner("alice").await.unwrap();
        assert_eq!(purchases.len(), 1);
        drop(reopened);
        let _ = std::fs::remove_dir_all(dir);
    }
}
