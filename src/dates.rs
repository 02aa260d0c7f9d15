//! Date-range resolution for load requests.
//!
//! A request either reprocesses the last N days (relative to "today" in
//! the request's timezone) or names an explicit inclusive range; asking
//! for both is contradictory and rejected before any other work happens.

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::error::{validation_error, ConnectorError};

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Render as `[start, end]` ISO strings for response payloads.
    pub fn to_iso_pair(&self) -> [String; 2] {
        [self.start.to_string(), self.end.to_string()]
    }

    /// Expand into one ISO date string per day, oldest first.
    pub fn day_list(&self) -> Vec<String> {
        let mut dates = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            dates.push(current.to_string());
            current += Duration::days(1);
        }
        dates
    }
}

/// Resolve the effective date range for a request.
///
/// `reprocess_last_x_days` defaults to 1; a request carrying explicit
/// dates must set it to 0. With a positive window the range is
/// `[today - n, yesterday]`; with both dates given it is used verbatim;
/// otherwise the range collapses to yesterday.
pub fn resolve_date_range(
    timezone: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
    reprocess_last_x_days: Option<i64>,
) -> Result<DateRange, ConnectorError> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| validation_error(format!("Unknown timezone: {timezone}")))?;
    let today = Utc::now().with_timezone(&tz).date_naive();
    resolve_with_today(today, start_date, end_date, reprocess_last_x_days)
}

/// Same as [`resolve_date_range`] with an injected "today" so tests stay
/// deterministic.
pub fn resolve_with_today(
    today: NaiveDate,
    start_date: Option<&str>,
    end_date: Option<&str>,
    reprocess_last_x_days: Option<i64>,
) -> Result<DateRange, ConnectorError> {
    let window = reprocess_last_x_days.unwrap_or(1);

    if window != 0 && (start_date.is_some() || end_date.is_some()) {
        return Err(validation_error(
            "If using start_date/end_date, set reprocess_last_x_days to 0.",
        ));
    }

    if window > 0 {
        return Ok(DateRange {
            start: today - Duration::days(window),
            end: today - Duration::days(1),
        });
    }

    if let (Some(start), Some(end)) = (start_date, end_date) {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        if start > end {
            return Err(validation_error(format!(
                "start_date {start} is after end_date {end}"
            )));
        }
        return Ok(DateRange { start, end });
    }

    let yesterday = today - Duration::days(1);
    Ok(DateRange {
        start: yesterday,
        end: yesterday,
    })
}

fn parse_date(text: &str) -> Result<NaiveDate, ConnectorError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| validation_error(format!("Invalid date (expected YYYY-MM-DD): {text}")))
}
