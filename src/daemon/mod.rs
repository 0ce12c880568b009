use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use blocklist::RuleEngine;
use collection::observer::{ObservationModule, TrackSignal};
use control::{control_socket_path, ControlModule};
use limit::{AlarmPresenter, CountdownTimer, LogAlarm, TimeUp};
use processing::{local_save::LocalSaver, ProcessingModule};
use storage::{entities::UsageRecordEntity, record_storage::RecordStorageImpl, settings::SettingsStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    browser::{BrowserProbe, SharedPageView},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod blocklist;
pub mod collection;
pub mod control;
pub mod limit;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod tracker;

/// How often the active page is re-observed between tab events.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let (record_tx, record_rx) = mpsc::channel::<UsageRecordEntity>(10);
    let (signal_tx, signal_rx) = mpsc::channel::<TrackSignal>(16);
    let (alarm_tx, alarm_rx) = mpsc::channel::<TimeUp>(4);

    let shutdown_token = CancellationToken::new();
    let view = SharedPageView::new();

    let settings = Arc::new(SettingsStore::new(dir.join("settings.json")));
    let rules = RuleEngine::new(dir.join("blocking_rules.json"));
    rules.restore(&settings.load().await?).await?;

    let mut timer = CountdownTimer::new(
        settings.clone(),
        Arc::new(DefaultClock),
        alarm_tx,
        shutdown_token.clone(),
    );
    timer.restore().await?;

    let control = ControlModule::bind(
        &control_socket_path(&dir),
        view.clone(),
        signal_tx,
        settings,
        rules,
        timer,
        shutdown_token.clone(),
    )?;

    let collector = create_collector(
        record_tx,
        Box::new(view.clone()),
        signal_rx,
        &shutdown_token,
        DefaultClock,
    );

    let processor = create_processor(dir.join("records"), record_rx)?;

    let (_, control_result, collection_result, processing_result, _) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        control.run(),
        collector.run(),
        processor.run(),
        run_alarms(alarm_rx, LogAlarm),
    );

    if let Err(control_result) = control_result {
        error!("Control module got an error {:?}", control_result);
    }

    if let Err(collection_result) = collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

fn create_collector(
    sender: mpsc::Sender<UsageRecordEntity>,
    probe: Box<dyn BrowserProbe>,
    signals: mpsc::Receiver<TrackSignal>,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> ObservationModule {
    ObservationModule::new(
        sender,
        probe,
        signals,
        shutdown_token.clone(),
        DEFAULT_POLL_INTERVAL,
        Box::new(clock),
    )
}

fn create_processor(
    record_dir: PathBuf,
    receiver: mpsc::Receiver<UsageRecordEntity>,
) -> Result<ProcessingModule<LocalSaver<RecordStorageImpl>>, anyhow::Error> {
    let storage = RecordStorageImpl::new(record_dir)?;
    let saver = LocalSaver::new(storage);
    Ok(ProcessingModule::new(receiver, saver))
}

/// Forwards time-up signals to the presenter. Ends when the last alarm
/// sender is gone.
async fn run_alarms(mut alarms: mpsc::Receiver<TimeUp>, presenter: impl AlarmPresenter) {
    while alarms.recv().await.is_some() {
        presenter.time_up();
    }
}
