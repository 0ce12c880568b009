use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;

use crate::daemon::storage::entities::UsageRecordEntity;

/// The interval currently being accumulated, not yet flushed to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInterval {
    pub domain: Arc<str>,
    pub since: DateTime<Utc>,
}

/// State machine attributing wall-clock time to the domain that is open.
///
/// Every observation either extends the current interval (same domain),
/// or closes it and opens a new one. Closing produces the record to
/// persist; the caller decides what to do with it. Keeping the state
/// explicit here, away from the event loop, lets transitions be tested
/// deterministically.
#[derive(Debug, Default)]
pub struct DomainTracker {
    current: Option<OpenInterval>,
}

impl DomainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The domain currently accumulating, if any.
    pub fn tracking(&self) -> Option<&OpenInterval> {
        self.current.as_ref()
    }

    /// Extracts the attribution key from a raw page url. Anything that is
    /// not a well-formed http(s) url has no domain and is not tracked.
    pub fn domain_of(raw: &str) -> Option<Arc<str>> {
        let url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.host_str().map(Arc::from)
    }

    /// Feeds one observation of the active page into the machine.
    ///
    /// A missing or untrackable url is not an error and causes no
    /// transition: the current interval keeps accumulating. A changed
    /// domain closes the running interval and starts a new one; the closed
    /// interval is returned for flushing when it lasted at least a whole
    /// second. Observing the same domain again is a no-op, so the periodic
    /// tick and event-driven triggers can race freely.
    pub fn observe(
        &mut self,
        url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<UsageRecordEntity> {
        let domain = url.and_then(Self::domain_of)?;

        if let Some(open) = &self.current {
            if open.domain == domain {
                return None;
            }
        }

        let flushed = self.close(now);
        self.current = Some(OpenInterval { domain, since: now });
        flushed
    }

    /// Unconditionally closes the running interval, leaving the machine
    /// idle. Used for the browser-closing signal and daemon shutdown.
    pub fn close(&mut self, now: DateTime<Utc>) -> Option<UsageRecordEntity> {
        let open = self.current.take()?;
        let elapsed = (now - open.since).num_seconds();
        if elapsed <= 0 {
            return None;
        }
        Some(UsageRecordEntity {
            id: 0,
            domain: open.domain,
            started_at: open.since,
            duration_seconds: elapsed as u64,
        })
    }
}
