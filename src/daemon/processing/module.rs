use anyhow::Result;

use crate::daemon::storage::entities::UsageRecordEntity;

/// Represents a record processor. This should realistically be able to
/// abstract over different sinks: local storage, remote server saving.
pub trait EventProcessor {
    fn process_next(
        &mut self,
        record: UsageRecordEntity,
    ) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
