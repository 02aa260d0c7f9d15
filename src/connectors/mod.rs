//! Per-platform connector orchestration.
//!
//! Each connector follows the same shape: validate and resolve request
//! parameters, resolve the platform and warehouse secrets, fetch rows
//! from the vendor, normalize, and load. Every invocation constructs its
//! own clients from the resolved credentials; nothing is shared across
//! requests.

pub mod dv360;
pub mod google_ads;
pub mod linkedin;
pub mod tiktok;

use serde::Serialize;

use crate::dates::DateRange;
use crate::error::{validation_error, ConnectorError};
use crate::warehouse::RefreshPolicy;

/// Structured result of a successful load.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoadOutcome {
    pub success: bool,
    pub rows_loaded: usize,
    pub date_range: [String; 2],
    pub destination: String,
}

/// Require a parameter that has no usable value.
pub fn require(value: Option<String>, key: &str) -> Result<String, ConnectorError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| validation_error(format!("Missing required parameter: {key}")))
}

/// Require a non-empty list parameter.
pub fn require_list(value: Vec<String>, key: &str) -> Result<Vec<String>, ConnectorError> {
    if value.is_empty() {
        return Err(validation_error(format!(
            "Missing required parameter: {key}"
        )));
    }
    Ok(value)
}

/// Build the refresh policy for a load, if one was requested.
///
/// A refresh needs both the `delete_existing` flag and a partition
/// column; with either missing the load is append-only.
pub fn refresh_policy(
    delete_existing: bool,
    partition_column: Option<&str>,
    range: DateRange,
    entity_ids: &[String],
) -> Option<RefreshPolicy> {
    let partition_column = partition_column.filter(|c| !c.is_empty())?;
    if !delete_existing {
        return None;
    }
    Some(RefreshPolicy {
        start_date: range.start,
        end_date: range.end,
        entity_ids: entity_ids.to_vec(),
        partition_column: partition_column.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        }
    }

    #[test]
    fn require_rejects_empty_values() {
        assert!(require(None, "secret_id").is_err());
        assert!(require(Some(String::new()), "secret_id").is_err());
        assert_eq!(require(Some("x".into()), "secret_id").unwrap(), "x");
    }

    #[test]
    fn refresh_needs_flag_and_partition_column() {
        let ids = vec!["1".to_string()];
        assert!(refresh_policy(false, Some("dt"), range(), &ids).is_none());
        assert!(refresh_policy(true, None, range(), &ids).is_none());
        assert!(refresh_policy(true, Some(""), range(), &ids).is_none());

        let policy = refresh_policy(true, Some("dt"), range(), &ids).unwrap();
        assert_eq!(policy.partition_column, "dt");
        assert_eq!(policy.entity_ids, ids);
        assert_eq!(policy.start_date, range().start);
    }
}
