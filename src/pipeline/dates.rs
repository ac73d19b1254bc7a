//! Date-Range Filter: resolves human range specs ("today", "this weekend",
//! "next 30 days") into concrete intervals anchored to the start of the
//! current civil day in the deployment's canonical time zone, then keeps
//! records whose start time falls inside.
//!
//! The canonical zone matters: the server process and its audience can sit
//! in different machine time zones, and "today" means the audience's today.
//! Records with no parseable start time are kept; a separate require-date
//! rule in the Validation Gate handles mandatory dates.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::domain::EventRecord;
use crate::observability::metrics;

static NEXT_N_DAYS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:next\s+)?(\d{1,3})\s+days?$").expect("range spec pattern"));

#[derive(Debug, Clone)]
pub struct DateRangeFilter {
    tz: Tz,
}

impl DateRangeFilter {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Resolve a range spec into a half-open `[start, end)` UTC interval,
    /// anchored to the start of `now`'s civil day in the canonical zone.
    pub fn resolve_range(&self, spec: &str, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let local_now = now.with_timezone(&self.tz);
        let today = local_now.date_naive();

        let (start_day, end_day) = match spec.trim().to_lowercase().as_str() {
            "today" => (today, today + Duration::days(1)),
            "tomorrow" => {
                let t = today + Duration::days(1);
                (t, t + Duration::days(1))
            }
            "this week" => {
                // Through the end of the current ISO week.
                let days_left = 7 - today.weekday().num_days_from_monday() as i64;
                (today, today + Duration::days(days_left))
            }
            "next week" => {
                let days_to_monday = 7 - today.weekday().num_days_from_monday() as i64;
                let monday = today + Duration::days(days_to_monday);
                (monday, monday + Duration::days(7))
            }
            "this weekend" => {
                let saturday = match today.weekday() {
                    Weekday::Sat | Weekday::Sun => today,
                    w => today + Duration::days(5 - w.num_days_from_monday() as i64),
                };
                let monday = if today.weekday() == Weekday::Sun {
                    today + Duration::days(1)
                } else {
                    saturday + Duration::days(2)
                };
                (saturday, monday)
            }
            "this month" => {
                let first_next = first_of_next_month(today);
                (today, first_next)
            }
            other => {
                let days = NEXT_N_DAYS
                    .captures(other)
                    .and_then(|c| c[1].parse::<i64>().ok())
                    .unwrap_or_else(|| {
                        if !other.is_empty() {
                            debug!("Unrecognized range spec '{}', defaulting to 30 days", other);
                        }
                        30
                    });
                (today, today + Duration::days(days))
            }
        };

        (self.day_start(start_day), self.day_start(end_day))
    }

    /// Midnight of `day` in the canonical zone, as a UTC instant. A
    /// DST-skipped midnight falls forward to the earliest valid time.
    fn day_start(&self, day: NaiveDate) -> DateTime<Utc> {
        let midnight = day.and_hms_opt(0, 0, 0).expect("midnight is always valid");
        self.tz
            .from_local_datetime(&midnight)
            .earliest()
            .unwrap_or_else(|| {
                self.tz
                    .from_local_datetime(&(midnight + Duration::hours(1)))
                    .earliest()
                    .unwrap_or_else(|| Utc.from_utc_datetime(&midnight).with_timezone(&self.tz))
            })
            .with_timezone(&Utc)
    }

    /// Keep records whose start time falls in the resolved window. Records
    /// with no start time are kept.
    pub fn filter(
        &self,
        records: Vec<EventRecord>,
        spec: &str,
        now: DateTime<Utc>,
    ) -> Vec<EventRecord> {
        let (start, end) = self.resolve_range(spec, now);
        records
            .into_iter()
            .filter(|r| match r.start_time {
                None => {
                    metrics::dates::unparsed();
                    true
                }
                Some(t) => {
                    let keep = t >= start && t < end;
                    if keep {
                        metrics::dates::kept();
                    } else {
                        metrics::dates::dropped();
                    }
                    keep
                }
            })
            .collect()
    }
}

fn first_of_next_month(day: NaiveDate) -> NaiveDate {
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventCategory;
    use chrono_tz::America::Los_Angeles;

    fn filter() -> DateRangeFilter {
        DateRangeFilter::new(Los_Angeles)
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn today_is_anchored_to_canonical_zone_not_utc() {
        // 2025-06-02 02:00 UTC is still 2025-06-01 19:00 in Los Angeles.
        let now = utc(2025, 6, 2, 2, 0);
        let (start, end) = filter().resolve_range("today", now);
        // Pacific daylight time: midnight local is 07:00 UTC.
        assert_eq!(start, utc(2025, 6, 1, 7, 0));
        assert_eq!(end, utc(2025, 6, 2, 7, 0));
    }

    #[test]
    fn this_weekend_spans_saturday_through_sunday() {
        // 2025-06-04 is a Wednesday.
        let now = utc(2025, 6, 4, 18, 0);
        let (start, end) = filter().resolve_range("this weekend", now);
        assert_eq!(start, utc(2025, 6, 7, 7, 0)); // Saturday local midnight
        assert_eq!(end, utc(2025, 6, 9, 7, 0)); // Monday local midnight
    }

    #[test]
    fn weekend_in_progress_starts_today() {
        // 2025-06-08 is a Sunday; 18:00 UTC = 11:00 local.
        let now = utc(2025, 6, 8, 18, 0);
        let (start, end) = filter().resolve_range("this weekend", now);
        assert_eq!(start, utc(2025, 6, 8, 7, 0));
        assert_eq!(end, utc(2025, 6, 9, 7, 0));
    }

    #[test]
    fn next_n_days_parses_count() {
        let now = utc(2025, 6, 1, 12, 0);
        let (start, end) = filter().resolve_range("next 7 days", now);
        assert_eq!(end - start, Duration::days(7));
    }

    #[test]
    fn unknown_spec_defaults_to_thirty_days() {
        let now = utc(2025, 6, 1, 12, 0);
        let (start, end) = filter().resolve_range("whenever", now);
        assert_eq!(end - start, Duration::days(30));
    }

    #[test]
    fn dateless_record_is_never_removed() {
        let now = utc(2025, 6, 1, 12, 0);
        let dateless = EventRecord::new("Jazz Night", EventCategory::Music, "exa");
        let kept = filter().filter(vec![dateless], "today", now);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn out_of_window_record_is_removed() {
        let now = utc(2025, 6, 1, 12, 0);
        let mut in_window = EventRecord::new("Tonight", EventCategory::Music, "ticketmaster");
        in_window.start_time = Some(utc(2025, 6, 1, 20, 0));
        let mut out_of_window = in_window.clone();
        out_of_window.title = "Next Month".to_string();
        out_of_window.start_time = Some(utc(2025, 7, 15, 20, 0));

        let kept = filter().filter(vec![in_window, out_of_window], "today", now);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Tonight");
    }
}
