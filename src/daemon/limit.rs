use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{daemon::storage::settings::SettingsStore, utils::clock::Clock};

/// Emitted once when the countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUp;

/// Consumes the time-up signal. Presentation (notification, alarm sound)
/// lives outside the daemon core.
pub trait AlarmPresenter: Send + Sync + 'static {
    fn time_up(&self);
}

pub struct LogAlarm;

impl AlarmPresenter for LogAlarm {
    fn time_up(&self) {
        warn!("Time's up! You've reached your browsing limit");
    }
}

/// Browsing time limit countdown. At most one countdown runs at a time:
/// starting a new one cancels the previous, so two limits can never race
/// each other decrementing `remaining_seconds`. Countdown tasks are
/// children of the daemon shutdown token and die with it.
pub struct CountdownTimer {
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    alarm: mpsc::Sender<TimeUp>,
    shutdown: CancellationToken,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl CountdownTimer {
    pub fn new(
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
        alarm: mpsc::Sender<TimeUp>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            clock,
            alarm,
            shutdown,
            running: None,
        }
    }

    /// Starts a countdown of `seconds`, replacing any running one.
    pub async fn start(&mut self, seconds: u64) -> Result<()> {
        self.cancel_running();
        info!("Starting a {seconds}s countdown");
        self.settings
            .update(|s| {
                s.time_limit_seconds = seconds;
                s.remaining_seconds = seconds;
            })
            .await?;

        let token = self.shutdown.child_token();
        let handle = tokio::spawn(countdown_loop(
            self.settings.clone(),
            self.clock.clone(),
            self.alarm.clone(),
            token.clone(),
            seconds,
        ));
        self.running = Some((token, handle));
        Ok(())
    }

    /// Cancels the running countdown, if any, and zeroes the persisted
    /// remainder so the ui stops showing a stale countdown.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel_running();
        self.settings.update(|s| s.remaining_seconds = 0).await?;
        Ok(())
    }

    /// Restarts a persisted limit after a daemon restart.
    pub async fn restore(&mut self) -> Result<()> {
        let settings = self.settings.load().await?;
        if settings.time_limit_seconds > 0 {
            self.start(settings.time_limit_seconds).await?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    fn cancel_running(&mut self) {
        if let Some((token, _)) = self.running.take() {
            token.cancel();
        }
    }
}

async fn countdown_loop(
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    alarm: mpsc::Sender<TimeUp>,
    token: CancellationToken,
    mut remaining: u64,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = clock.sleep(Duration::from_secs(1)) => {
                remaining = remaining.saturating_sub(1);

                // Keep the persisted remainder fresh for the ui.
                if let Err(e) = settings.update(|s| s.remaining_seconds = remaining).await {
                    error!("Failed to persist remaining time {e:?}");
                }

                if remaining == 0 {
                    let _ = alarm.send(TimeUp).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use tokio::time::timeout;

    use crate::utils::clock::DefaultClock;

    use super::*;

    fn timer(dir: &std::path::Path) -> (CountdownTimer, mpsc::Receiver<TimeUp>) {
        let settings = Arc::new(SettingsStore::new(dir.join("settings.json")));
        let (alarm_tx, alarm_rx) = mpsc::channel(4);
        (
            CountdownTimer::new(
                settings,
                Arc::new(DefaultClock),
                alarm_tx,
                CancellationToken::new(),
            ),
            alarm_rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_reaches_zero_and_alarms() -> Result<()> {
        let dir = tempdir()?;
        let (mut timer, mut alarm_rx) = timer(dir.path());

        timer.start(3).await?;
        assert_eq!(alarm_rx.recv().await, Some(TimeUp));

        let settings = timer.settings.load().await?;
        assert_eq!(settings.remaining_seconds, 0);
        assert_eq!(settings.time_limit_seconds, 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn starting_again_replaces_the_countdown() -> Result<()> {
        let dir = tempdir()?;
        let (mut timer, mut alarm_rx) = timer(dir.path());

        timer.start(100_000).await?;
        timer.start(2).await?;

        assert_eq!(alarm_rx.recv().await, Some(TimeUp));
        // only the replacement fires, the first countdown is gone
        assert!(
            timeout(Duration::from_secs(5), alarm_rx.recv())
                .await
                .is_err(),
            "cancelled countdown still alarmed"
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_and_zeroes_remainder() -> Result<()> {
        let dir = tempdir()?;
        let (mut timer, mut alarm_rx) = timer(dir.path());

        timer.start(100_000).await?;
        assert!(timer.is_running());
        timer.stop().await?;

        assert_eq!(timer.settings.load().await?.remaining_seconds, 0);
        assert!(
            timeout(Duration::from_secs(5), alarm_rx.recv())
                .await
                .is_err(),
            "stopped countdown still alarmed"
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn restore_restarts_a_saved_limit() -> Result<()> {
        let dir = tempdir()?;
        let (mut timer, mut alarm_rx) = timer(dir.path());

        timer
            .settings
            .save(&crate::daemon::storage::settings::Settings {
                time_limit_seconds: 2,
                ..Default::default()
            })
            .await?;

        timer.restore().await?;
        assert_eq!(alarm_rx.recv().await, Some(TimeUp));
        Ok(())
    }
}
