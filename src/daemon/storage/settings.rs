use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// User-facing knobs. Small, rarely changing, loaded whole and replaced
/// whole. Every field defaults so documents written by older versions keep
/// loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub focus_mode_enabled: bool,
    /// Order is kept for display, it has no meaning for blocking.
    pub blocked_sites: Vec<String>,
    pub time_limit_seconds: u64,
    pub remaining_seconds: u64,
}

/// Persisted key/value settings document. The daemon is the only writer,
/// the cli only ever reads.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn load(&self) -> Result<Settings> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&raw) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                // Might happen after a shutdown cut the write short. Losing
                // settings is recoverable, losing the daemon is not.
                warn!("Settings document at {:?} is corrupt: {e}", self.path);
                Ok(Settings::default())
            }
        }
    }

    pub async fn save(&self, settings: &Settings) -> Result<()> {
        let raw = serde_json::to_vec_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Load-modify-save in one step.
    pub async fn update(&self, apply: impl FnOnce(&mut Settings)) -> Result<Settings> {
        let mut settings = self.load().await?;
        apply(&mut settings);
        self.save(&settings).await?;
        Ok(settings)
    }
}
