use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::utils::time::{date_to_record_name, record_name_to_date};

use super::entities::UsageRecordEntity;

/// Interface for abstracting storage of records.
pub trait RecordStorage {
    type RecordFile: RecordFileHandle;

    /// Opens or creates the record file for a given local day. Data is
    /// written into a file per day so that date-range reads only touch the
    /// files they need.
    fn create_or_append_record(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Self::RecordFile>>;

    /// Retrieves all records stored for a certain day.
    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<UsageRecordEntity>>> + Send;
}

impl<T: Deref> RecordStorage for T
where
    T::Target: RecordStorage,
{
    type RecordFile = <T::Target as RecordStorage>::RecordFile;

    fn create_or_append_record(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Self::RecordFile>> {
        self.deref().create_or_append_record(date)
    }

    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<UsageRecordEntity>>> + Send {
        self.deref().get_data_for(date)
    }
}

pub trait RecordFileHandle {
    /// Appends a record, assigning its ordinal. Returns the stored record.
    fn append(
        &mut self,
        record: UsageRecordEntity,
    ) -> impl Future<Output = Result<UsageRecordEntity>>;
    fn get_date(&self) -> NaiveDate;
    fn flush(&mut self) -> impl Future<Output = Result<()>>;
}

/// The main realization of [RecordStorage].
pub struct RecordStorageImpl {
    record_dir: PathBuf,
}

impl RecordStorageImpl {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    /// Days that have a record file, sorted ascending. Files whose names
    /// aren't dates are ignored.
    pub fn list_days(&self) -> Result<Vec<NaiveDate>> {
        let mut days = vec![];
        for entry in std::fs::read_dir(&self.record_dir)? {
            let entry = entry?;
            if let Some(day) = entry.file_name().to_str().and_then(record_name_to_date) {
                days.push(day);
            }
        }
        days.sort();
        Ok(days)
    }

    async fn get_all_inner(&self, path: &Path) -> Result<Vec<UsageRecordEntity>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<UsageRecordEntity>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut records = vec![];
            while let Ok(Some(v)) = lines.next_line().await {
                match serde_json::from_str::<UsageRecordEntity>(&v) {
                    Ok(v) => records.push(v),
                    Err(e) => {
                        // ignore illegal values. Might happen after shutdowns
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &v
                        )
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(records)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }
}

impl RecordStorage for RecordStorageImpl {
    type RecordFile = UsageRecordFile;

    async fn create_or_append_record(&self, date: NaiveDate) -> Result<Self::RecordFile> {
        let file_name = date_to_record_name(date);
        let path = self.record_dir.join(file_name);

        let file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(path)
            .await?;

        UsageRecordFile::open(file, date).await
    }

    async fn get_data_for(&self, date: NaiveDate) -> Result<Vec<UsageRecordEntity>> {
        let file_name = date_to_record_name(date);
        let path = self.record_dir.join(file_name);
        let data = self.get_all_inner(&path).await?;
        Ok(data)
    }
}

pub struct UsageRecordFile {
    file: File,
    date: NaiveDate,
    next_ordinal: u64,
}

impl RecordFileHandle for UsageRecordFile {
    async fn append(&mut self, record: UsageRecordEntity) -> Result<UsageRecordEntity> {
        self.append_inner(record).await
    }

    fn get_date(&self) -> NaiveDate {
        self.date
    }

    async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}

impl UsageRecordFile {
    /// Seeds the ordinal counter from the lines already present, then
    /// positions the file at its end for appending.
    async fn open(mut file: File, date: NaiveDate) -> Result<Self> {
        file.lock_shared()?;
        let existing = count_lines(&mut file).await;
        file.unlock_async().await?;
        let existing = existing?;
        file.seek(std::io::SeekFrom::End(0)).await?;

        Ok(Self {
            file,
            date,
            next_ordinal: existing,
        })
    }

    async fn append_inner(&mut self, record: UsageRecordEntity) -> Result<UsageRecordEntity> {
        let record = record.with_id(self.next_ordinal);

        let mut buffer = serde_json::to_vec(&record)?;
        buffer.push(b'\n');

        // Semi-safe acquire-release for a file
        self.file.lock_exclusive()?;
        let result = async {
            self.file.write_all(&buffer).await?;
            self.file.flush().await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        self.file.unlock_async().await?;
        result?;

        self.next_ordinal += 1;
        Ok(record)
    }
}

async fn count_lines(file: &mut File) -> Result<u64, std::io::Error> {
    file.seek(std::io::SeekFrom::Start(0)).await?;
    let mut lines = BufReader::new(&mut *file).lines();
    let mut count = 0;
    while lines.next_line().await?.is_some() {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::{
        entities::UsageRecordEntity,
        record_storage::{RecordFileHandle, RecordStorage, RecordStorageImpl},
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn record(domain: &str, offset_s: i64, duration_s: u64) -> UsageRecordEntity {
        UsageRecordEntity {
            id: 0,
            domain: domain.into(),
            started_at: Utc.from_utc_datetime(&TEST_START_DATE) + chrono::Duration::seconds(offset_s),
            duration_seconds: duration_s,
        }
    }

    #[tokio::test]
    async fn test_record_storage_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let mut file = storage.create_or_append_record(TEST_START_DATE.date()).await?;

        let first = file.append(record("a.com", 0, 30)).await?;
        let second = file.append(record("b.com", 30, 60)).await?;
        file.flush().await?;

        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);

        let stored = storage.get_data_for(TEST_START_DATE.date()).await?;
        assert_eq!(stored, vec![first, second]);

        Ok(())
    }

    #[tokio::test]
    async fn test_ordinals_continue_after_reopen() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        let mut file = storage.create_or_append_record(TEST_START_DATE.date()).await?;
        file.append(record("a.com", 0, 10)).await?;
        file.flush().await?;
        drop(file);

        let mut file = storage.create_or_append_record(TEST_START_DATE.date()).await?;
        let appended = file.append(record("b.com", 10, 20)).await?;
        file.flush().await?;

        assert_eq!(appended.id, 1);

        let stored = storage.get_data_for(TEST_START_DATE.date()).await?;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].id, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_line_is_skipped() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        let mut file = storage.create_or_append_record(TEST_START_DATE.date()).await?;
        let kept = file.append(record("a.com", 0, 10)).await?;
        file.flush().await?;
        drop(file);

        let path = dir
            .path()
            .join(crate::utils::time::date_to_record_name(TEST_START_DATE.date()));
        let mut raw = std::fs::OpenOptions::new().append(true).open(path)?;
        raw.write_all(b"{\"domain\": truncated by shutdow\n")?;

        let stored = storage.get_data_for(TEST_START_DATE.date()).await?;
        assert_eq!(stored, vec![kept]);

        Ok(())
    }

    #[tokio::test]
    async fn test_list_days_ignores_foreign_files() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        let later = TEST_START_DATE.date().succ_opt().unwrap();
        for day in [later, TEST_START_DATE.date()] {
            let mut file = storage.create_or_append_record(day).await?;
            file.append(record("a.com", 0, 1)).await?;
            file.flush().await?;
        }
        std::fs::write(dir.path().join("settings.json"), b"{}")?;

        assert_eq!(storage.list_days()?, vec![TEST_START_DATE.date(), later]);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_day_reads_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        let stored = storage.get_data_for(TEST_START_DATE.date()).await?;
        assert!(stored.is_empty());

        Ok(())
    }
}
