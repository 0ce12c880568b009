use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    browser::{ActivePageData, SharedPageView},
    daemon::{
        blocklist::{normalize_site, RuleEngine},
        collection::observer::TrackSignal,
        limit::CountdownTimer,
        storage::settings::SettingsStore,
    },
};

pub fn control_socket_path(app_dir: &Path) -> PathBuf {
    app_dir.join("control.sock")
}

/// A command sent to the daemon over the control socket, one json object
/// per line. The browser companion sends the tab signals, the cli sends
/// everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// The user switched to another tab.
    TabActivated { url: String },
    /// A tab finished loading.
    TabUpdated { url: String },
    /// Browser window focus changed. No url means no browser window has
    /// focus anymore.
    WindowFocusChanged { url: Option<String> },
    /// The browser is shutting down.
    BrowserClosing,
    /// Replace the block list with the given sites.
    UpdateBlocking { sites: Vec<String> },
    /// Turn focus mode on or off.
    SetFocusMode { enabled: bool },
    /// Start a countdown of the given length, replacing a running one.
    StartTimer { seconds: u64 },
    StopTimer,
    Status,
    /// Request the daemon to stop.
    Stop,
}

/// A response sent back for every command line.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: None,
        }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
        }
    }
}

/// Listens on the control socket and applies commands to the daemon's
/// moving parts. Connections are served one at a time: the control surface
/// is sequential by design, so commands can never interleave.
pub struct ControlModule {
    listener: UnixListener,
    view: SharedPageView,
    signals: mpsc::Sender<TrackSignal>,
    settings: std::sync::Arc<SettingsStore>,
    rules: RuleEngine,
    timer: CountdownTimer,
    shutdown: CancellationToken,
}

impl ControlModule {
    #[allow(clippy::too_many_arguments)]
    pub fn bind(
        socket_path: &Path,
        view: SharedPageView,
        signals: mpsc::Sender<TrackSignal>,
        settings: std::sync::Arc<SettingsStore>,
        rules: RuleEngine,
        timer: CountdownTimer,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        // A previous daemon may have left its socket behind.
        match std::fs::remove_file(socket_path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(socket_path)?;
        Ok(Self {
            listener,
            view,
            signals,
            settings,
            rules,
            timer,
            shutdown,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(());
                }
                connection = self.listener.accept() => {
                    match connection {
                        Ok((stream, _)) => {
                            if let Err(e) = self.serve(stream).await {
                                warn!("Control connection ended with an error {e:?}");
                            }
                        }
                        Err(e) => error!("Failed to accept control connection {e:?}"),
                    }
                }
            }
        }
    }

    async fn serve(&mut self, stream: UnixStream) -> Result<()> {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let command = serde_json::from_str::<Command>(&line);
            let stopping = matches!(command, Ok(Command::Stop));
            let response = match command {
                Ok(command) => self.dispatch(command).await,
                Err(e) => Response::error(format!("Unrecognized command: {e}")),
            };

            let mut out = serde_json::to_vec(&response)?;
            out.push(b'\n');
            write.write_all(&out).await?;
            write.flush().await?;

            if stopping {
                self.shutdown.cancel();
                return Ok(());
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, command: Command) -> Response {
        match self.dispatch_inner(command).await {
            Ok(response) => response,
            Err(e) => {
                error!("Command failed {e:?}");
                Response::error(format!("{e:#}"))
            }
        }
    }

    async fn dispatch_inner(&mut self, command: Command) -> Result<Response> {
        match command {
            Command::TabActivated { url } | Command::TabUpdated { url } => {
                self.view.set(Some(ActivePageData { url: url.into() }));
                self.signals.send(TrackSignal::Observe).await?;
                Ok(Response::ok())
            }
            Command::WindowFocusChanged { url } => {
                self.view.set(url.map(|url| ActivePageData { url: url.into() }));
                self.signals.send(TrackSignal::Observe).await?;
                Ok(Response::ok())
            }
            Command::BrowserClosing => {
                self.view.set(None);
                self.signals.send(TrackSignal::Close).await?;
                Ok(Response::ok())
            }
            Command::UpdateBlocking { sites } => {
                let mut cleaned: Vec<String> = vec![];
                for site in &sites {
                    match normalize_site(site) {
                        Some(site) if !cleaned.contains(&site) => cleaned.push(site),
                        _ => return Ok(Response::error(format!("Invalid or duplicate site: {site:?}"))),
                    }
                }

                let settings = self
                    .settings
                    .update(|s| s.blocked_sites = cleaned.clone())
                    .await?;
                if settings.focus_mode_enabled {
                    self.rules.apply_block_list(&settings.blocked_sites).await?;
                }
                Ok(Response::ok_with_message(format!(
                    "Block list updated, {} site(s)",
                    settings.blocked_sites.len()
                )))
            }
            Command::SetFocusMode { enabled } => {
                let settings = self
                    .settings
                    .update(|s| s.focus_mode_enabled = enabled)
                    .await?;
                self.rules.restore(&settings).await?;
                info!("Focus mode {}", if enabled { "enabled" } else { "disabled" });
                Ok(Response::ok_with_message(format!(
                    "Focus mode {}",
                    if enabled { "enabled" } else { "disabled" }
                )))
            }
            Command::StartTimer { seconds } => {
                if seconds == 0 {
                    return Ok(Response::error("Time limit must be positive"));
                }
                self.timer.start(seconds).await?;
                Ok(Response::ok_with_message(format!(
                    "Countdown of {seconds}s started"
                )))
            }
            Command::StopTimer => {
                self.timer.stop().await?;
                Ok(Response::ok_with_message("Countdown stopped"))
            }
            Command::Status => {
                let settings = self.settings.load().await?;
                let page = self
                    .view
                    .get()
                    .map(|p| p.url.to_string())
                    .unwrap_or_else(|| "none".into());
                Ok(Response::ok_with_message(format!(
                    "active page: {page}, focus mode: {}, blocked sites: {}, remaining: {}s",
                    if settings.focus_mode_enabled { "on" } else { "off" },
                    settings.blocked_sites.len(),
                    settings.remaining_seconds,
                )))
            }
            Command::Stop => Ok(Response::ok_with_message("Stopping daemon")),
        }
    }
}

/// One-shot client used by the cli and the companion.
pub async fn send_command(socket_path: &Path, command: &Command) -> Result<Response> {
    let stream = UnixStream::connect(socket_path).await?;
    let (read, mut write) = stream.into_split();

    let mut out = serde_json::to_vec(command)?;
    out.push(b'\n');
    write.write_all(&out).await?;
    write.flush().await?;

    let mut lines = BufReader::new(read).lines();
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow::anyhow!("Daemon closed the connection without responding"))?;
    Ok(serde_json::from_str(&line)?)
}
