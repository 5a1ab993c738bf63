use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::analytics::device::DeviceType;
use crate::identifier::leading_unsigned_digits;

pub const DEFAULT_WINDOW_DAYS: u32 = 14;
pub const MAX_WINDOW_DAYS: u32 = 90;

/// The part of a stored click the report needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsEvent {
    pub created_at: DateTime<Utc>,
    pub device: DeviceType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceCounts {
    pub desktop: u64,
    pub mobile: u64,
    pub bot: u64,
}

impl DeviceCounts {
    fn add(&mut self, device: DeviceType) {
        match device {
            DeviceType::Desktop => self.desktop += 1,
            DeviceType::Mobile => self.mobile += 1,
            DeviceType::Bot => self.bot += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTotals {
    pub desktop: u64,
    pub mobile: u64,
    pub bot: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyBucket {
    pub date: String,
    #[serde(flatten)]
    pub counts: DeviceCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsReport {
    pub days: u32,
    pub totals: ReportTotals,
    pub series: Vec<DailyBucket>,
}

/// Window length from the `days` query value: invalid or non-positive falls
/// back to the default, large values are capped.
pub fn normalize_days(value: Option<&str>) -> u32 {
    let Some(digits) = value.and_then(leading_unsigned_digits) else {
        return DEFAULT_WINDOW_DAYS;
    };

    match digits.parse::<u32>() {
        Ok(0) => DEFAULT_WINDOW_DAYS,
        Ok(days) => days.min(MAX_WINDOW_DAYS),
        // only overflow is left, which is still a positive number
        Err(_) => MAX_WINDOW_DAYS,
    }
}

/// First UTC day included in a window of `days` ending on `today`.
pub fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today - Duration::days(i64::from(days.saturating_sub(1)))
}

/// Buckets events per UTC calendar day, oldest first. Events outside the
/// window are ignored.
pub fn build_report(days: u32, today: NaiveDate, events: &[AnalyticsEvent]) -> AnalyticsReport {
    let start = window_start(today, days);
    let dates: Vec<NaiveDate> = start
        .iter_days()
        .take_while(|date| *date <= today)
        .collect();

    let mut buckets: HashMap<NaiveDate, DeviceCounts> = dates
        .iter()
        .map(|date| (*date, DeviceCounts::default()))
        .collect();

    for event in events {
        if let Some(bucket) = buckets.get_mut(&event.created_at.date_naive()) {
            bucket.add(event.device);
        }
    }

    let mut totals = ReportTotals {
        desktop: 0,
        mobile: 0,
        bot: 0,
        total: 0,
    };
    let series = dates
        .into_iter()
        .map(|date| {
            let counts = buckets.remove(&date).unwrap_or_default();
            totals.desktop += counts.desktop;
            totals.mobile += counts.mobile;
            totals.bot += counts.bot;
            DailyBucket {
                date: date.format("%Y-%m-%d").to_string(),
                counts,
            }
        })
        .collect();
    totals.total = totals.desktop + totals.mobile + totals.bot;

    AnalyticsReport {
        days,
        totals,
        series,
    }
}
