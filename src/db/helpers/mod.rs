use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::models::PurchaseSource;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_source(value: &str) -> Result<PurchaseSource> {
    match value {
        "Manual" => Ok(PurchaseSource::Manual),
        "Email" => Ok(PurchaseSource::Email),
        other => Err(anyhow!("unknown purchase source {other}")),
    }
}

/// Trim and drop empty strings so blank form fields are stored as NULL.
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetimes_round_trip_through_rfc3339() {
        let now = Utc::now();
        let parsed = parse_datetime(&now.to_rfc3339(), "created_at").unwrap();
        assert_eq!(parsed, now);
        assert!(parse_datetime("yesterday", "created_at").is_err());
        assert_eq!(parse_optional_datetime(None, "purchased_at").unwrap(), None);
    }

    #[test]
    fn sources_parse_from_stored_names() {
        assert_eq!(parse_source("Email").unwrap(), PurchaseSource::Email);
        assert_eq!(
            parse_source(PurchaseSource::Manual.as_str()).unwrap(),
            PurchaseSource::Manual
        );
        assert!(parse_source("Marketplace").is_err());
    }

    #[test]
    fn blank_optionals_become_none() {
        assert_eq!(clean_optional(Some("  ".into())), None);
        assert_eq!(clean_optional(Some(" 1Z99 ".into())), Some("1Z99".into()));
        assert_eq!(clean_optional(None), None);
    }
}
