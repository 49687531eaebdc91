//! Per-day activity history for an agent.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::raw;

/// History window requested from the backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
        }
    }
}

impl core::fmt::Display for Period {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One day of activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub calls: u64,
    pub sales: u64,
    pub talk_time_hours: f64,
}

/// Normalize a history payload, oldest first. Undated entries are dropped.
pub fn reconcile_history(payload: &Value) -> Vec<HistoryPoint> {
    let mut points: Vec<HistoryPoint> = raw::records_in(payload, &["history", "data"])
        .into_iter()
        .filter_map(|r| {
            let date = r.opt_text(&["date", "jour", "day"])?;
            let date = date.get(..10).unwrap_or(&date);
            Some(HistoryPoint {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?,
                calls: r.count(&["total_calls", "totalCalls", "calls"]),
                sales: r.count(&["total_sales", "totalSales", "bookings", "sales"]),
                talk_time_hours: r.hours(&["talk_time_hours", "talkTimeHours"]),
            })
        })
        .collect();
    points.sort_by_key(|p| p.date);
    points
}
