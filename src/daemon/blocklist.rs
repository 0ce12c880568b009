use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::daemon::storage::settings::Settings;

/// Rule ids start here so the companion can tell our rules apart from
/// anything else it manages.
const RULE_ID_BASE: u32 = 1000;

/// One network-blocking rule, in the wire shape the browser companion
/// consumes. Matches top-level page loads to the domain, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRule {
    pub id: u32,
    pub priority: u32,
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
}

/// Cleans up one block-list entry as typed by the user. Strips an accidental
/// scheme or trailing path, lowercases the host. Returns None for entries
/// with nothing left to block.
pub fn normalize_site(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

pub fn build_rules(domains: &[String]) -> Vec<BlockRule> {
    domains
        .iter()
        .enumerate()
        .map(|(index, site)| BlockRule {
            id: RULE_ID_BASE + index as u32,
            priority: 1,
            url_filter: format!("||{site}^"),
            resource_types: vec![ResourceType::MainFrame],
        })
        .collect()
}

/// Owns the rule file the browser companion watches. Every update rewrites
/// the whole set: old rules are removed, never merged, which makes applying
/// the same list twice a no-op.
pub struct RuleEngine {
    rules_path: PathBuf,
}

impl RuleEngine {
    pub fn new(rules_path: PathBuf) -> Self {
        Self { rules_path }
    }

    /// Replaces all active blocking rules with one rule per domain.
    pub async fn apply_block_list(&self, domains: &[String]) -> Result<Vec<BlockRule>> {
        let rules = build_rules(domains);
        let raw = serde_json::to_vec_pretty(&rules)?;
        let tmp = self.rules_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, &self.rules_path).await?;
        info!("Blocking rules updated: {:?}", domains);
        Ok(rules)
    }

    pub async fn clear(&self) -> Result<()> {
        self.apply_block_list(&[]).await?;
        Ok(())
    }

    pub async fn active_rules(&self) -> Result<Vec<BlockRule>> {
        let raw = match tokio::fs::read(&self.rules_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Re-applies the persisted block list after a daemon restart. Focus
    /// mode off means no rules, even if a list is saved.
    pub async fn restore(&self, settings: &Settings) -> Result<()> {
        if settings.focus_mode_enabled {
            debug!("Focus mode is on, restoring blocking");
            self.apply_block_list(&settings.blocked_sites).await?;
        } else {
            debug!("Focus mode is off");
            self.clear().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn normalize_strips_scheme_and_path() {
        assert_eq!(
            normalize_site("https://www.Youtube.com/feed"),
            Some("www.youtube.com".into())
        );
        assert_eq!(normalize_site("  reddit.com  "), Some("reddit.com".into()));
        assert_eq!(normalize_site("http://x.com?q=1"), Some("x.com".into()));
        assert_eq!(normalize_site(""), None);
        assert_eq!(normalize_site("https://"), None);
        assert_eq!(normalize_site("   "), None);
    }

    #[test]
    fn rules_get_sequential_ids() {
        let rules = build_rules(&["a.com".into(), "b.com".into()]);

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, 1000);
        assert_eq!(rules[1].id, 1001);
        assert_eq!(rules[0].url_filter, "||a.com^");
        assert_eq!(rules[0].resource_types, vec![ResourceType::MainFrame]);
    }

    #[test]
    fn rule_wire_shape_is_camel_case() {
        let json = serde_json::to_string(&build_rules(&["a.com".into()])).unwrap();
        assert!(json.contains("\"urlFilter\":\"||a.com^\""), "{json}");
        assert!(json.contains("\"resourceTypes\":[\"main_frame\"]"), "{json}");
    }

    #[tokio::test]
    async fn applying_twice_leaves_one_rule_per_domain() -> Result<()> {
        let dir = tempdir()?;
        let engine = RuleEngine::new(dir.path().join("blocking_rules.json"));
        let sites = vec!["a.com".to_string(), "b.com".to_string()];

        engine.apply_block_list(&sites).await?;
        engine.apply_block_list(&sites).await?;

        let rules = engine.active_rules().await?;
        assert_eq!(rules, build_rules(&sites));
        Ok(())
    }

    #[tokio::test]
    async fn reapplying_replaces_stale_rules() -> Result<()> {
        let dir = tempdir()?;
        let engine = RuleEngine::new(dir.path().join("blocking_rules.json"));

        engine
            .apply_block_list(&["a.com".to_string(), "b.com".to_string()])
            .await?;
        engine.apply_block_list(&["c.com".to_string()]).await?;

        let rules = engine.active_rules().await?;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].url_filter, "||c.com^");
        Ok(())
    }

    #[tokio::test]
    async fn restore_honors_focus_flag() -> Result<()> {
        let dir = tempdir()?;
        let engine = RuleEngine::new(dir.path().join("blocking_rules.json"));
        let mut settings = Settings {
            focus_mode_enabled: true,
            blocked_sites: vec!["a.com".into()],
            ..Settings::default()
        };

        engine.restore(&settings).await?;
        assert_eq!(engine.active_rules().await?.len(), 1);

        settings.focus_mode_enabled = false;
        engine.restore(&settings).await?;
        assert!(engine.active_rules().await?.is_empty());
        Ok(())
    }
}
