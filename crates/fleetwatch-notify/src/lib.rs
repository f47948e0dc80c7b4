//! fleetwatch-notify: outbound status notifications.
//!
//! Formats a health snapshot and the pipeline status into a plain-text
//! report and posts it to a webhook as `{"text": ...}`. Delivery is
//! best-effort: failures are logged and never reach the caller.

pub mod notifier;
pub mod report;

pub use notifier::{NotifyError, Notifier};
pub use report::{format_report, status_changes};
