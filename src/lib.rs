// Core layer - configuration, errors and message helpers
pub mod core;

// Features layer - the reminder domain
pub mod features;

// Application layer
pub mod commands;

pub use crate::core::Config;
pub use commands::ConversationHandler;
pub use features::{
    ChatId, CronCompiler, DiscordDispatcher, NotificationDispatcher, ReminderItem,
    ReminderScheduler, ReminderStore,
};
