use crate::models::PurchaseRecord;

/// Drop every whitespace character and case-fold.
pub fn normalize(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// First record whose tracking number equals `code` after normalization.
///
/// Exact equality only. Tracking numbers are expected to be unique per
/// owner, but nothing here enforces it.
pub fn match_order<'a>(code: &str, records: &'a [PurchaseRecord]) -> Option<&'a PurchaseRecord> {
    let needle = normalize(code);
    if needle.is_empty() {
        return None;
    }

    records.iter().find(|record| {
        record
            .tracking_number
            .as_deref()
            .map(|tracking| normalize(tracking) == needle)
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PurchaseInput;

    fn record(id: &str, tracking: Option<&str>) -> PurchaseRecord {
        PurchaseRecord::new(
            id,
            "owner-1",
            PurchaseInput {
                product: format!("product {id}"),
                tracking_number: tracking.map(str::to_string),
                ..PurchaseInput::default()
            },
        )
    }

    #[test]
    fn match_ignores_case_and_whitespace() {
        let records = vec![
            record("a", None),
            record("b", Some(" 1Z999AA1 0123 45675\t")),
        ];

        let found = match_order("1z999aa1012345675", &records).unwrap();
        assert_eq!(found.id, "b");
    }

    #[test]
    fn first_match_wins() {
        let records = vec![
            record("first", Some("123456789012")),
            record("second", Some("123456789012")),
        ];
        assert_eq!(match_order("123456789012", &records).unwrap().id, "first");
    }

    #[test]
    fn no_partial_matches() {
        let records = vec![record("a", Some("9400109699939926709875"))];
        assert!(match_order("94001096999399267098", &records).is_none());
        assert!(match_order("9400109699939926709875X", &records).is_none());
        assert!(match_order("   ", &records).is_none());
    }

    #[test]
    fn normalization_round_trips() {
        for tracking in ["1Z999AA1012345675", " 9400 1096 9993 9926 7098 75 ", "abcDEF123456"] {
            let normalized = normalize(tracking);
            assert_eq!(normalize(&normalized), normalized);

            let records = vec![record("x", Some(tracking))];
            assert!(match_order(&normalized, &records).is_some());
            assert!(match_order(&tracking.to_uppercase(), &records).is_some());
        }
    }
}
