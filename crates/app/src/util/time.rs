use chrono::{NaiveDate, Utc};

use crate::error::{AppError, Result};

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date '{value}', expected YYYY-MM-DD")))
}

/// Optional date bounds, rejected when reversed.
pub fn resolve_dates(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(AppError::InvalidInput(format!(
                "start date {start} is after end date {end}"
            )));
        }
    }
    Ok((start, end))
}

/// Aggregation window: `start` is required, `end` defaults to today (UTC).
pub fn resolve_window(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(NaiveDate, NaiveDate)> {
    let Some(start) = start else {
        return Err(AppError::InvalidInput(
            "aggregation needs a start date".to_string(),
        ));
    };
    let end = end.unwrap_or_else(|| Utc::now().date_naive());
    resolve_dates(Some(start), Some(end))?;
    Ok((start, end))
}
