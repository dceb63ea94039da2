//! # Reminders Feature
//!
//! Named, recurring cron reminders built through a guided chat flow and
//! kept firing by a reconciling scheduler.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Cron reminders with conversational setup and reconciliation
//! - 1.0.0: Initial release

pub mod dispatcher;
pub mod schedule;
pub mod scheduler;
pub mod session;
pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use dispatcher::{DiscordDispatcher, NotificationDispatcher};
pub use schedule::{CronCompiler, ScheduleCompiler, Timetable};
pub use scheduler::{ReconcileReport, ReminderScheduler, TaskInfo, TaskKey};
pub use session::{CommitResult, ConversationSession, Prompt, Reverted, SessionRegistry, SessionState};
pub use store::ReminderStore;

/// Identifier of a conversation endpoint (DM or group channel)
pub type ChatId = i64;

/// A reminder definition as persisted in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderItem {
    /// Message sent on every firing
    pub text: String,
    /// Cron expression driving the firings
    #[serde(rename = "cron")]
    pub schedule: String,
}

impl ReminderItem {
    pub fn new(text: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            schedule: schedule.into(),
        }
    }
}

/// Every committed reminder, keyed by chat then by name
pub type Snapshot = BTreeMap<ChatId, BTreeMap<String, ReminderItem>>;
