use std::{collections::HashMap, sync::Arc};

use chrono::{Datelike, NaiveDate};

use crate::daemon::storage::entities::UsageRecordEntity;

/// Calendar window a report is computed over. Records match on the local
/// calendar fields of their start moment, the same fields their day files
/// are named after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSpec {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    Year(i32),
}

impl FilterSpec {
    pub fn matches(&self, record: &UsageRecordEntity) -> bool {
        let date = record.local_date();
        match *self {
            FilterSpec::Day(day) => date == day,
            FilterSpec::Month { year, month } => date.year() == year && date.month() == month,
            FilterSpec::Year(year) => date.year() == year,
        }
    }

    /// First and last day of the window, for picking which day files to
    /// read.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        match *self {
            FilterSpec::Day(day) => (day, day),
            FilterSpec::Month { year, month } => {
                let first = NaiveDate::from_ymd_opt(year, month, 1)
                    .expect("month filters are validated at parse time");
                let last = first
                    .checked_add_months(chrono::Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .expect("end of time should never happen");
                (first, last)
            }
            FilterSpec::Year(year) => (
                NaiveDate::from_ymd_opt(year, 1, 1).expect("january 1st always exists"),
                NaiveDate::from_ymd_opt(year, 12, 31).expect("december 31st always exists"),
            ),
        }
    }
}

pub fn filter_records(
    records: impl IntoIterator<Item = UsageRecordEntity>,
    spec: &FilterSpec,
) -> Vec<UsageRecordEntity> {
    records.into_iter().filter(|r| spec.matches(r)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainUsage {
    pub domain: Arc<str>,
    pub seconds: u64,
}

/// Derived statistics for one filter window. Never persisted, recomputed
/// from the record log on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSummary {
    pub total_seconds: u64,
    pub distinct_domain_count: usize,
    /// Sorted by time spent descending. Ties are broken by domain name so
    /// the ranking doesn't depend on input order.
    pub per_domain_seconds: Vec<DomainUsage>,
    /// Seconds per local hour-of-day. A record counts wholly towards the
    /// hour it started in.
    pub hourly: [u64; 24],
}

impl UsageSummary {
    /// Hour with the most activity, lowest hour winning ties. None when
    /// there is no activity at all, rendered as "N/A".
    pub fn most_active_hour(&self) -> Option<u32> {
        let (hour, seconds) = self
            .hourly
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))?;
        if *seconds == 0 {
            None
        } else {
            Some(hour as u32)
        }
    }
}

pub fn summarize(records: &[UsageRecordEntity]) -> UsageSummary {
    let mut per_domain = HashMap::<Arc<str>, u64>::new();
    let mut hourly = [0u64; 24];
    let mut total_seconds = 0u64;

    for record in records {
        total_seconds += record.duration_seconds;
        *per_domain.entry(record.domain.clone()).or_default() += record.duration_seconds;
        hourly[record.local_hour() as usize] += record.duration_seconds;
    }

    let distinct_domain_count = per_domain.len();
    let mut per_domain_seconds = per_domain
        .into_iter()
        .map(|(domain, seconds)| DomainUsage { domain, seconds })
        .collect::<Vec<_>>();
    per_domain_seconds.sort_by(|a, b| b.seconds.cmp(&a.seconds).then(a.domain.cmp(&b.domain)));

    UsageSummary {
        total_seconds,
        distinct_domain_count,
        per_domain_seconds,
        hourly,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone, Utc};

    use super::*;

    /// Records are built from local wall-clock moments because filters and
    /// hour buckets work on local fields.
    fn record(domain: &str, y: i32, mo: u32, d: u32, h: u32, secs: u64) -> UsageRecordEntity {
        UsageRecordEntity {
            id: 0,
            domain: domain.into(),
            started_at: Local
                .with_ymd_and_hms(y, mo, d, h, 15, 0)
                .unwrap()
                .with_timezone(&Utc),
            duration_seconds: secs,
        }
    }

    fn sample_log() -> Vec<UsageRecordEntity> {
        vec![
            record("a.com", 2025, 3, 18, 9, 120),
            record("b.com", 2025, 3, 18, 10, 60),
            record("a.com", 2025, 3, 19, 9, 30),
            record("c.com", 2025, 2, 10, 22, 600),
            record("a.com", 2024, 12, 1, 9, 200),
        ]
    }

    #[test]
    fn day_filter_keeps_exact_calendar_day() {
        let spec = FilterSpec::Day(NaiveDate::from_ymd_opt(2025, 3, 18).unwrap());
        let filtered = filter_records(sample_log(), &spec);

        let summary = summarize(&filtered);
        assert_eq!(summary.total_seconds, 180);
        assert_eq!(summary.distinct_domain_count, 2);
        assert_eq!(
            summary.per_domain_seconds,
            vec![
                DomainUsage {
                    domain: "a.com".into(),
                    seconds: 120
                },
                DomainUsage {
                    domain: "b.com".into(),
                    seconds: 60
                },
            ]
        );
    }

    #[test]
    fn month_and_year_filters_use_calendar_fields() {
        let by_month = filter_records(sample_log(), &FilterSpec::Month { year: 2025, month: 3 });
        assert_eq!(by_month.len(), 3);

        let by_year = filter_records(sample_log(), &FilterSpec::Year(2025));
        assert_eq!(by_year.len(), 4);

        let by_year = filter_records(sample_log(), &FilterSpec::Year(2024));
        assert_eq!(by_year.len(), 1);
    }

    #[test]
    fn filtering_is_idempotent() {
        let spec = FilterSpec::Month { year: 2025, month: 3 };
        let once = filter_records(sample_log(), &spec);
        let twice = filter_records(once.clone(), &spec);
        assert_eq!(once, twice);
    }

    #[test]
    fn summarize_is_order_independent() {
        let mut reversed = sample_log();
        reversed.reverse();
        assert_eq!(summarize(&sample_log()), summarize(&reversed));
    }

    #[test]
    fn hourly_buckets_attribute_whole_durations_to_start_hour() {
        // 59 minutes starting at 9:15 still counts entirely towards hour 9
        let records = vec![record("a.com", 2025, 3, 18, 9, 59 * 60)];
        let summary = summarize(&records);

        assert_eq!(summary.hourly[9], 59 * 60);
        assert_eq!(summary.hourly[10], 0);
        assert_eq!(summary.most_active_hour(), Some(9));
    }

    #[test]
    fn tied_hours_resolve_to_the_lowest() {
        let records = vec![
            record("a.com", 2025, 3, 18, 1, 5),
            record("b.com", 2025, 3, 18, 0, 5),
        ];
        assert_eq!(summarize(&records).most_active_hour(), Some(0));
    }

    #[test]
    fn empty_log_yields_zeroes_and_no_active_hour() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_seconds, 0);
        assert_eq!(summary.distinct_domain_count, 0);
        assert_eq!(summary.per_domain_seconds, vec![]);
        assert_eq!(summary.most_active_hour(), None);
    }

    #[test]
    fn month_range_covers_whole_month() {
        let (first, last) = FilterSpec::Month { year: 2024, month: 2 }.date_range();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (first, last) = FilterSpec::Year(2025).date_range();
        assert_eq!(first, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }
}
