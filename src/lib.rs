//! Daemon/cli pair for tracking how much time you spend on each website.
//! A thin browser companion reports tab activity over a local socket, the
//! daemon turns it into per-domain usage intervals, and the cli renders
//! reports, exports and focus-mode controls on top of them.
//!

pub mod browser;
pub mod cli;
pub mod daemon;
pub mod utils;
