//! Rolling coverage window in the index's entry-date semantics.

use chrono::{DateTime, Days, NaiveDate, Utc};
use std::fmt;

use crate::config::WindowSettings;

/// Date format the index expects for `mindate`/`maxdate`.
const INDEX_DATE_FORMAT: &str = "%Y/%m/%d";

/// Inclusive date range searched against the entry date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl SearchWindow {
    /// Window ending on the reference instant's calendar day in the
    /// configured timezone and starting `lookback_days` earlier.
    #[must_use]
    pub fn ending_at(reference: DateTime<Utc>, settings: &WindowSettings) -> Self {
        let end = reference.with_timezone(&settings.timezone).date_naive();
        let start = end
            .checked_sub_days(Days::new(u64::from(settings.lookback_days)))
            .unwrap_or(end);
        Self { start, end }
    }

    /// Build a window from explicit dates, swapping them if reversed.
    #[must_use]
    pub fn between(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// `mindate` parameter value.
    pub fn index_start(&self) -> String {
        self.start.format(INDEX_DATE_FORMAT).to_string()
    }

    /// `maxdate` parameter value.
    pub fn index_end(&self) -> String {
        self.end.format(INDEX_DATE_FORMAT).to_string()
    }
}

impl fmt::Display for SearchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings(days: u32, tz: &str) -> WindowSettings {
        WindowSettings::new(days, tz).unwrap()
    }

    #[test]
    fn test_seven_day_window() {
        let reference = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let window = SearchWindow::ending_at(reference, &settings(7, "America/New_York"));

        assert_eq!(window.start(), NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());
        assert_eq!(window.end(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(window.index_start(), "2024/03/08");
        assert_eq!(window.index_end(), "2024/03/15");
    }

    #[test]
    fn test_reference_timezone_decides_the_day() {
        // 02:00 UTC is still the previous evening in New York.
        let reference = Utc.with_ymd_and_hms(2024, 3, 15, 2, 0, 0).unwrap();

        let ny = SearchWindow::ending_at(reference, &settings(7, "America/New_York"));
        assert_eq!(ny.end(), NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());

        let utc = SearchWindow::ending_at(reference, &settings(7, "UTC"));
        assert_eq!(utc.end(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn test_deterministic_for_same_reference() {
        let reference = Utc.with_ymd_and_hms(2024, 1, 3, 9, 30, 0).unwrap();
        let s = settings(14, "Europe/London");
        assert_eq!(
            SearchWindow::ending_at(reference, &s),
            SearchWindow::ending_at(reference, &s)
        );
        let window = SearchWindow::ending_at(reference, &s);
        assert_eq!(window.index_start(), "2023/12/20");
    }

    #[test]
    fn test_between_keeps_start_before_end() {
        let a = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let window = SearchWindow::between(a, b);
        assert!(window.start() <= window.end());
        assert_eq!(window.to_string(), "2024-03-08 to 2024-03-15");
    }
}
