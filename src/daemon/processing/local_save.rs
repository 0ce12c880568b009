use anyhow::Result;

use crate::daemon::storage::{
    entities::UsageRecordEntity,
    record_storage::{RecordFileHandle, RecordStorage},
};

use super::module::EventProcessor;

/// Bridges [ProcessingModule](super::ProcessingModule) and [RecordStorage].
/// A record lands in the day file named after the local date it started on,
/// not the date it was flushed, so an interval closed just past midnight
/// stays in the day a calendar filter will look for it in.
pub struct LocalSaver<R: RecordStorage> {
    records_storage: R,
    current_handle: Option<R::RecordFile>,
}

impl<R: RecordStorage> LocalSaver<R> {
    pub fn new(records_storage: R) -> Self {
        Self {
            records_storage,
            current_handle: None,
        }
    }

    async fn move_file_handle(&mut self, record: &UsageRecordEntity) -> Result<R::RecordFile> {
        let date = record.local_date();
        let current_file = self.current_handle.take();

        match current_file {
            Some(mut file) if file.get_date() != date => {
                file.flush().await?;
            }
            Some(v) => return Ok(v),
            None => {}
        };
        self.records_storage.create_or_append_record(date).await
    }
}

impl<R: RecordStorage> EventProcessor for LocalSaver<R> {
    async fn process_next(&mut self, record: UsageRecordEntity) -> anyhow::Result<()> {
        let mut active_file = self.move_file_handle(&record).await?;

        active_file.append(record).await?;

        self.current_handle = Some(active_file);

        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(v) = self.current_handle.as_mut() {
            v.flush().await?;
        }
        Ok(())
    }
}
