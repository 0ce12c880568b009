use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{
    browser::BrowserProbe, daemon::storage::entities::UsageRecordEntity,
    daemon::tracker::DomainTracker, utils::clock::Clock,
};

/// Nudges delivered by the control listener. Both kinds funnel into the
/// same tracker transitions the periodic tick uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSignal {
    /// A tab/window event happened, re-observe the active page now.
    Observe,
    /// The browser is closing, drain the open interval.
    Close,
}

/// Event loop turning page observations into closed usage intervals.
///
/// Two sources wake it: a fixed-cadence tick and [TrackSignal]s from the
/// control socket. Flushed records are handed to the processing channel
/// before the next interval starts accumulating, which keeps records for a
/// domain ordered even though persistence completes later.
pub struct ObservationModule {
    next: mpsc::Sender<UsageRecordEntity>,
    producer: Box<dyn BrowserProbe>,
    signals: mpsc::Receiver<TrackSignal>,
    shutdown: CancellationToken,
    tracker: DomainTracker,
    poll_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl ObservationModule {
    pub fn new(
        next: mpsc::Sender<UsageRecordEntity>,
        producer: Box<dyn BrowserProbe>,
        signals: mpsc::Receiver<TrackSignal>,
        shutdown: CancellationToken,
        poll_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer,
            signals,
            shutdown,
            tracker: DomainTracker::new(),
            poll_interval,
            time_provider,
        }
    }

    /// Observes the active page once. Probe failures are logged and treated
    /// as "nothing observed", the loop must keep running across them.
    fn observe_once(&mut self) -> Option<UsageRecordEntity> {
        let page = match self.producer.active_page() {
            Ok(page) => page,
            Err(e) => {
                error!("Encountered an error during observation {:?}", e);
                return None;
            }
        };
        let now = self.time_provider.time();
        self.tracker
            .observe(page.as_ref().map(|p| p.url.as_ref()), now)
    }

    async fn send_flushed(&mut self, record: Option<UsageRecordEntity>) -> Result<()> {
        let Some(record) = record else {
            return Ok(());
        };
        let span = info_span!("Processing flushed interval");
        debug!("Sending record {:?}", record);
        self.next
            .send(record)
            .instrument(span)
            .await
            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        info!("Successfully sent record");
        Ok(())
    }

    /// Executes the observation event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut tick_point = self.time_provider.instant() + self.poll_interval;
        loop {
            tokio::select! {
                // Cancelation stops the loop. The open interval is drained
                // first so no observed time is lost, then dropping the
                // sender stops the processing module as well.
                _ = self.shutdown.cancelled() => {
                    let now = self.time_provider.time();
                    let tail = self.tracker.close(now);
                    return self.send_flushed(tail).await;
                }
                signal = self.signals.recv() => {
                    match signal {
                        Some(TrackSignal::Observe) => {
                            let flushed = self.observe_once();
                            self.send_flushed(flushed).await?;
                        }
                        Some(TrackSignal::Close) => {
                            let now = self.time_provider.time();
                            let flushed = self.tracker.close(now);
                            self.send_flushed(flushed).await?;
                        }
                        // The control surface is gone, no signal can ever
                        // arrive again. Drain and stop.
                        None => {
                            let now = self.time_provider.time();
                            let tail = self.tracker.close(now);
                            return self.send_flushed(tail).await;
                        }
                    }
                }
                _ = self.time_provider.sleep_until(tick_point) => {
                    tick_point += self.poll_interval;
                    let flushed = self.observe_once();
                    self.send_flushed(flushed).await?;
                }
            }
        }
    }
}
