use chrono::DateTime;
use chrono::Local;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use std::sync::Arc;

/// A closed usage interval attributed to one domain. This is the struct
/// stored on disk, one json line per record. Records are append-only:
/// once written they are never rewritten, the tracker only ever produces
/// new ones.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone)]
pub struct UsageRecordEntity {
    /// Ordinal assigned by the store on append. Opaque to consumers,
    /// unique within a day file.
    #[serde(default)]
    pub id: u64,
    /// Hostname the time is attributed to, no scheme or path.
    pub domain: Arc<str>,
    /// Moment the interval started accumulating. Serialized as an
    /// ISO-8601 string.
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u64,
}

impl UsageRecordEntity {
    pub fn end(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::seconds(self.duration_seconds as i64)
    }

    /// Calendar date of the start moment in local time. Day files are named
    /// after this date and calendar filters compare against it, so write and
    /// read stay consistent.
    pub fn local_date(&self) -> NaiveDate {
        self.started_at.with_timezone(&Local).date_naive()
    }

    /// Local hour-of-day (0..24) the whole duration is attributed to.
    pub fn local_hour(&self) -> u32 {
        use chrono::Timelike;
        self.started_at.with_timezone(&Local).hour()
    }

    pub fn with_id(self, id: u64) -> Self {
        Self { id, ..self }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn serializes_timestamp_as_iso_8601() {
        let record = UsageRecordEntity {
            id: 3,
            domain: "example.com".into(),
            started_at: Utc.with_ymd_and_hms(2025, 3, 18, 9, 30, 0).unwrap(),
            duration_seconds: 120,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"2025-03-18T09:30:00Z\""), "{json}");

        let back: UsageRecordEntity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn missing_id_defaults_to_zero() {
        let json = r#"{"domain":"a.com","started_at":"2025-03-18T09:30:00Z","duration_seconds":5}"#;
        let record: UsageRecordEntity = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 0);
        assert_eq!(record.duration_seconds, 5);
    }

    #[test]
    fn end_adds_duration() {
        let record = UsageRecordEntity {
            id: 0,
            domain: "a.com".into(),
            started_at: Utc.with_ymd_and_hms(2025, 3, 18, 23, 59, 0).unwrap(),
            duration_seconds: 90,
        };
        assert_eq!(
            record.end(),
            Utc.with_ymd_and_hms(2025, 3, 19, 0, 0, 30).unwrap()
        );
    }
}
