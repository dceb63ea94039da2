//! Inbound chat text resolved into a command
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

/// Reply that abandons the current setup
pub const CANCEL_KEYWORD: &str = "cancel";
/// Reply that steps the current setup back one stage
pub const REVERT_KEYWORD: &str = "back";
/// Reply that commits the current setup
pub const SAVE_KEYWORD: &str = "save";

/// Slash triggers and what they do, for `/help`
pub const COMMAND_HELP: &[(&str, &str)] = &[
    ("/start", "set up a new reminder for this chat"),
    ("/reminders", "list the reminders saved for this chat"),
    ("/forget <name>", "delete a saved reminder"),
    ("/edit", "change a saved reminder (not available yet)"),
    ("/import", "import reminders (not available yet)"),
    ("/info", "about this bot"),
    ("/help", "show this message"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Begin,
    Help,
    Info,
    List,
    Delete(String),
    Edit,
    Import,
    Cancel,
    Revert,
    Save,
    Text(String),
}

impl Command {
    /// Resolve raw message text. Keywords only match verbatim; anything
    /// unrecognised is passed through as [`Command::Text`].
    pub fn parse(text: &str) -> Self {
        match text {
            CANCEL_KEYWORD => return Command::Cancel,
            REVERT_KEYWORD => return Command::Revert,
            SAVE_KEYWORD => return Command::Save,
            _ => {}
        }

        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            let (word, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let command = match word {
                "start" => Some(Command::Begin),
                "help" => Some(Command::Help),
                "info" => Some(Command::Info),
                "reminders" => Some(Command::List),
                "forget" => Some(Command::Delete(args.trim().to_string())),
                "edit" => Some(Command::Edit),
                "import" => Some(Command::Import),
                _ => None,
            };
            if let Some(command) = command {
                return command;
            }
        }

        Command::Text(text.to_string())
    }
}
