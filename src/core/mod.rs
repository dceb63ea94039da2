//! # Core Module
//!
//! Configuration, the error taxonomy and outbound message helpers shared by
//! every feature.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod config;
pub mod error;
pub mod response;

// Re-export commonly used items
pub use config::Config;
pub use error::{NameRejection, ReminderError};
pub use response::{split_message, split_text, MESSAGE_LIMIT};
