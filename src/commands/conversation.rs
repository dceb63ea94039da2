//! Routes each inbound chat message to the setup flow, the store or the
//! scheduler, and produces the reply.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use log::{debug, error, info, warn};
use std::sync::Arc;

use super::command::{Command, CANCEL_KEYWORD, COMMAND_HELP, REVERT_KEYWORD, SAVE_KEYWORD};
use crate::core::{NameRejection, ReminderError};
use crate::features::reminders::{
    ChatId, CommitResult, NotificationDispatcher, Prompt, ReminderScheduler, ReminderStore,
    Reverted, ScheduleCompiler, SessionRegistry,
};

const IDLE_REPLY: &str =
    "I'm a reminder bot and only understand reminder commands. Send /start to set one up or /help for more.";

const EXAMPLE_CRON: &str = "0 */2 * * *";

pub struct ConversationHandler {
    sessions: SessionRegistry,
    store: Arc<ReminderStore>,
    scheduler: Arc<ReminderScheduler>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    admin_chat: Option<ChatId>,
}

impl ConversationHandler {
    pub fn new(
        store: Arc<ReminderStore>,
        compiler: Arc<dyn ScheduleCompiler>,
        scheduler: Arc<ReminderScheduler>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        admin_chat: Option<ChatId>,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(store.clone(), compiler),
            store,
            scheduler,
            dispatcher,
            admin_chat,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Handle one text message from `chat` and return the reply
    pub async fn handle_text(&self, chat: ChatId, text: &str) -> String {
        let command = Command::parse(text);
        debug!("Chat {chat} sent {command:?}");
        self.handle(chat, command).await
    }

    pub async fn handle(&self, chat: ChatId, command: Command) -> String {
        match command {
            Command::Begin => render_prompt(&self.sessions.begin(chat)),
            Command::Help => help_text(),
            Command::Info => format!(
                "I send the reminders you set up here on a cron schedule.\nVersion `{}`",
                env!("CARGO_PKG_VERSION")
            ),
            Command::List => self.list(chat),
            Command::Delete(name) => self.delete(chat, &name).await,
            Command::Edit => "Editing reminders isn't available yet.".to_string(),
            Command::Import => "Importing reminders isn't available yet.".to_string(),
            Command::Cancel => {
                if self.sessions.cancel(chat) {
                    info!("Chat {chat} cancelled reminder setup");
                    "Setup cancelled.".to_string()
                } else {
                    no_session_reply(CANCEL_KEYWORD)
                }
            }
            Command::Revert => match self.sessions.with_session(chat, |s| s.revert()) {
                Some(Reverted::Moved(prompt)) => render_prompt(&prompt),
                Some(Reverted::NoOp(prompt)) => {
                    format!("There's no earlier step.\n{}", render_prompt(&prompt))
                }
                None => no_session_reply(REVERT_KEYWORD),
            },
            Command::Save => self.save(chat).await,
            Command::Text(text) => match self.sessions.with_session(chat, |s| s.advance(&text)) {
                Some(Ok(prompt)) => render_prompt(&prompt),
                Some(Err(e)) => render_rejection(&e),
                None => IDLE_REPLY.to_string(),
            },
        }
    }

    async fn save(&self, chat: ChatId) -> String {
        // Out of the map while the store is written so the shard stays free
        let Some(mut session) = self.sessions.take(chat) else {
            return no_session_reply(SAVE_KEYWORD);
        };
        let name = session.name().unwrap_or_default().to_string();

        let joined = tokio::task::spawn_blocking(move || {
            let outcome = session.commit();
            (session, outcome)
        })
        .await;
        let outcome = match joined {
            Ok((session, outcome)) => {
                self.sessions.restore(session);
                outcome
            }
            Err(e) => {
                error!("Commit task for chat {chat} failed: {e}");
                self.escalate(format!("Saving reminder \"{name}\" for chat {chat} failed: {e}"))
                    .await;
                return "Saving the reminder failed, something went wrong on my side. Send /start to try again.".to_string();
            }
        };

        match outcome {
            Err(prompt) => {
                format!("There's nothing to save yet.\n{}", render_prompt(&prompt))
            }
            Ok(CommitResult::Committed) => {
                self.reschedule().await;
                format!("Saved your reminder \"{name}\".")
            }
            // Lost a race with another save of the same name
            Ok(CommitResult::Failed(e)) if e.is_user_recoverable() => format!(
                "A reminder called \"{name}\" was saved in the meantime.\nReply \"{REVERT_KEYWORD}\" twice to pick another name, or \"{CANCEL_KEYWORD}\" to stop."
            ),
            Ok(CommitResult::Failed(e)) => {
                self.escalate(format!("Saving reminder \"{name}\" for chat {chat} failed: {e}"))
                    .await;
                format!(
                    "Saving the reminder failed, something went wrong on my side.\nReply \"{SAVE_KEYWORD}\" to try again, \"{REVERT_KEYWORD}\" to change the schedule, or \"{CANCEL_KEYWORD}\" to stop."
                )
            }
        }
    }

    fn list(&self, chat: ChatId) -> String {
        let reminders = self.store.reminders_for(chat);
        if reminders.is_empty() {
            return "No reminders are set up here. Send /start to create one.".to_string();
        }

        let mut reply = String::from("Reminders in this chat:\n");
        for (name, item) in reminders {
            reply.push_str(&format!("- {name}: `{}`\n", item.schedule));
        }
        reply.push_str("Send /forget <name> to delete one.");
        reply
    }

    async fn delete(&self, chat: ChatId, name: &str) -> String {
        if name.is_empty() {
            return "Tell me which reminder to delete, e.g. /forget Drink Water".to_string();
        }

        match self.store.remove(chat, name) {
            Ok(true) => {
                self.reschedule().await;
                format!("Deleted reminder \"{name}\".")
            }
            Ok(false) => format!("There's no reminder called \"{name}\" here."),
            Err(e) => {
                self.escalate(format!("Deleting reminder \"{name}\" for chat {chat} failed: {e}"))
                    .await;
                "Deleting the reminder failed, please try again later.".to_string()
            }
        }
    }

    /// Bring running tasks in line with the store after a change
    async fn reschedule(&self) {
        match self.scheduler.reconcile().await {
            Ok(report) => debug!("Rescheduled: {report:?}"),
            Err(e) => {
                error!("Reconciliation after store change failed: {e}");
                self.escalate(format!("Reloading reminder schedules failed: {e}"))
                    .await;
            }
        }
    }

    /// Report a server-side failure to the admin chat, if configured
    async fn escalate(&self, message: String) {
        let Some(admin) = self.admin_chat else {
            return;
        };
        if let Err(e) = self.dispatcher.send(admin, &message).await {
            warn!("Failed to notify admin chat {admin}: {e:#}");
        }
    }
}

fn no_session_reply(keyword: &str) -> String {
    format!("You're not setting up a reminder, so \"{keyword}\" does nothing.")
}

fn help_text() -> String {
    let mut text = String::from("Here's what I can do:\n");
    for (trigger, description) in COMMAND_HELP {
        text.push_str(&format!("{trigger} - {description}\n"));
    }
    text.push_str(&format!(
        "While setting up, reply \"{REVERT_KEYWORD}\" to go back a step, \"{SAVE_KEYWORD}\" to save or \"{CANCEL_KEYWORD}\" to stop."
    ));
    text
}

pub fn render_prompt(prompt: &Prompt) -> String {
    match prompt {
        Prompt::AskName => format!(
            "Let's set up a reminder. What should it be called? The name is also the message I'll send.\nReply \"{CANCEL_KEYWORD}\" to stop."
        ),
        Prompt::AskSchedule { name } => format!(
            "When should \"{name}\" go off? Send a cron expression in UTC, e.g. `{EXAMPLE_CRON}` for every two hours.\nReply \"{REVERT_KEYWORD}\" to rename it."
        ),
        Prompt::ConfirmSave { name, schedule } => format!(
            "\"{name}\" will go off on `{schedule}` (UTC).\nReply \"{SAVE_KEYWORD}\" to keep it or \"{REVERT_KEYWORD}\" to change the schedule."
        ),
        Prompt::Closed => "This setup has already finished. Send /start to begin another.".to_string(),
    }
}

fn render_rejection(error: &ReminderError) -> String {
    match error {
        ReminderError::InvalidName(NameRejection::Empty) => {
            "The name can't be empty, please send a name.".to_string()
        }
        ReminderError::InvalidName(NameRejection::Duplicate(name)) => {
            format!("There's already a reminder called \"{name}\" here, please pick another name.")
        }
        ReminderError::InvalidSchedule { expression, reason } => format!(
            "`{expression}` isn't a schedule I understand ({reason}).\nPlease send a cron expression such as `{EXAMPLE_CRON}`."
        ),
        ReminderError::NoActiveSession => render_prompt(&Prompt::Closed),
        other => format!("Something went wrong: {other}"),
    }
}
