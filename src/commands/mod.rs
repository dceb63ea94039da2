//! # Command System
//!
//! Turns inbound chat text into commands and drives the reminder flow.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod command;
pub mod conversation;

pub use command::{Command, CANCEL_KEYWORD, COMMAND_HELP, REVERT_KEYWORD, SAVE_KEYWORD};
pub use conversation::ConversationHandler;
