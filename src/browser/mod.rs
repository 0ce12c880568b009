//! Contains logic for observing which page is currently active in the
//! browser. [SharedPageView] is the main artifact of this module: the
//! control listener writes the latest reported tab into it, and the
//! observation loop reads it back out on every tick.

use std::sync::{Arc, Mutex};

use anyhow::Result;

/// Snapshot of the page the browser currently has focused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePageData {
    /// Full page url as reported by the companion. For example
    /// 'https://www.youtube.com/watch?v=x'
    pub url: Arc<str>,
}

/// Intended to serve as a contract for "which site is active now" sources.
#[cfg_attr(test, mockall::automock)]
pub trait BrowserProbe: Send {
    /// Returns the active page, or None when no page is focused (browser
    /// closed, focus on another application).
    fn active_page(&mut self) -> Result<Option<ActivePageData>>;
}

/// Probe backed by shared state. Tab signals update it as they arrive, the
/// periodic tick re-reads it, so both sources observe the same page.
#[derive(Clone, Default)]
pub struct SharedPageView {
    inner: Arc<Mutex<Option<ActivePageData>>>,
}

impl SharedPageView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, page: Option<ActivePageData>) {
        *self.inner.lock().expect("page view lock poisoned") = page;
    }

    pub fn get(&self) -> Option<ActivePageData> {
        self.inner.lock().expect("page view lock poisoned").clone()
    }
}

impl BrowserProbe for SharedPageView {
    fn active_page(&mut self) -> Result<Option<ActivePageData>> {
        Ok(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_roundtrip() {
        let view = SharedPageView::new();
        assert_eq!(view.get(), None);

        view.set(Some(ActivePageData {
            url: "https://example.com/a".into(),
        }));
        let mut probe = view.clone();
        assert_eq!(
            probe.active_page().unwrap(),
            Some(ActivePageData {
                url: "https://example.com/a".into()
            })
        );

        view.set(None);
        assert_eq!(probe.active_page().unwrap(), None);
    }
}
