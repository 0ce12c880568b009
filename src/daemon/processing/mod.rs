use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use super::storage::entities::UsageRecordEntity;

pub mod local_save;
pub mod module;

/// Single consumer of flushed usage intervals. Being the only writer it
/// serializes appends, so records leave the queue in the order the tracker
/// flushed them. A failed append is logged and dropped: losing one interval
/// is acceptable, stalling collection is not.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<UsageRecordEntity>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<UsageRecordEntity>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(record) = self.receiver.recv().await {
            debug!("Processing record {:?}", record);
            match self.processor.process_next(record.clone()).await {
                Ok(_) => {
                    info!("Processed record {:?}", record)
                }
                Err(e) => {
                    error!("Error processing record {:?}: {e:?}", record)
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
