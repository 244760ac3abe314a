//! Session handle and its background-job and notification policy.

pub mod manager;
pub mod notify;

pub use manager::{BuildScope, Session};
pub use notify::{Notifier, Trigger};
