//! Report specification value object.
//!
//! Captures everything a Bid Manager report definition needs: advertiser
//! filters, grouping dimensions, metrics, and a custom date range. The
//! output format is fixed to CSV and the schedule to a one-time run.

use chrono::{Datelike, NaiveDate};
use serde_json::{json, Value};

/// An immutable specification for a one-time CSV report.
///
/// Dimension order is preserved: it determines output grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSpecification {
    advertiser_ids: Vec<String>,
    dimensions: Vec<String>,
    metrics: Vec<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl ReportSpecification {
    /// Create a specification for the given advertisers, grouping fields,
    /// metrics, and inclusive date range.
    pub fn new(
        advertiser_ids: Vec<String>,
        dimensions: Vec<String>,
        metrics: Vec<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            advertiser_ids,
            dimensions,
            metrics,
            start_date,
            end_date,
        }
    }

    pub fn advertiser_ids(&self) -> &[String] {
        &self.advertiser_ids
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Build the `queries.create` request body.
    ///
    /// One `FILTER_ADVERTISER` filter per advertiser id, a CUSTOM_DATES
    /// range, CSV output, ONE_TIME schedule.
    pub fn to_create_body(&self, title: &str) -> Value {
        let filters: Vec<Value> = self
            .advertiser_ids
            .iter()
            .map(|id| json!({"type": "FILTER_ADVERTISER", "value": id}))
            .collect();

        json!({
            "metadata": {
                "title": title,
                "dataRange": {
                    "range": "CUSTOM_DATES",
                    "customStartDate": date_parts(self.start_date),
                    "customEndDate": date_parts(self.end_date),
                },
                "format": "CSV",
            },
            "params": {
                "type": "STANDARD",
                "groupBys": self.dimensions,
                "filters": filters,
                "metrics": self.metrics,
            },
            "schedule": {"frequency": "ONE_TIME"},
        })
    }
}

/// Calendar date in the `{year, month, day}` shape the API expects.
fn date_parts(date: NaiveDate) -> Value {
    json!({
        "year": date.year(),
        "month": date.month(),
        "day": date.day(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ReportSpecification {
        ReportSpecification::new(
            vec!["1".to_string()],
            vec!["D".to_string()],
            vec!["M".to_string()],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[test]
    fn create_body_contains_advertiser_filter() {
        let body = spec().to_create_body("report");
        let filters = body["params"]["filters"].as_array().unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0]["type"], "FILTER_ADVERTISER");
        assert_eq!(filters[0]["value"], "1");
    }

    #[test]
    fn create_body_contains_custom_date_range() {
        let body = spec().to_create_body("report");
        let range = &body["metadata"]["dataRange"];
        assert_eq!(range["range"], "CUSTOM_DATES");
        assert_eq!(range["customStartDate"]["year"], 2024);
        assert_eq!(range["customStartDate"]["month"], 1);
        assert_eq!(range["customStartDate"]["day"], 1);
        assert_eq!(range["customEndDate"]["day"], 31);
    }

    #[test]
    fn create_body_is_csv_one_time() {
        let body = spec().to_create_body("report");
        assert_eq!(body["metadata"]["format"], "CSV");
        assert_eq!(body["schedule"]["frequency"], "ONE_TIME");
    }

    #[test]
    fn dimension_order_is_preserved() {
        let spec = ReportSpecification::new(
            vec![],
            vec!["FILTER_DATE".into(), "FILTER_ADVERTISER".into()],
            vec![],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        let body = spec.to_create_body("t");
        let groups = body["params"]["groupBys"].as_array().unwrap();
        assert_eq!(groups[0], "FILTER_DATE");
        assert_eq!(groups[1], "FILTER_ADVERTISER");
    }
}
