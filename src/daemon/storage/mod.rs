//!  Storage is organized through [record_storage::RecordStorageImpl] and
//!  [settings::SettingsStore].
//!  The basic idea is:
//!   - There is a directory with all the records.
//!   - Records are stored in per-day files, named after the local date the
//!     interval started on.
//!   - Each record is a closed interval: domain, start moment, duration.
//!   - Settings (focus mode, block list, time limit) live in a single json
//!     document next to the records.

pub mod entities;
pub mod record_storage;
pub mod settings;
