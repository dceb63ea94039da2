//! Per-chat guided setup of a new reminder.
//!
//! A session walks `AwaitingName → AwaitingSchedule → ReadyToSave` and ends
//! either `Committed` (written to the store) or `Abandoned`. Only
//! [`ConversationSession::commit`] touches durable storage.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;

use super::schedule::ScheduleCompiler;
use super::store::ReminderStore;
use super::{ChatId, ReminderItem};
use crate::core::{NameRejection, ReminderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingName,
    AwaitingSchedule,
    ReadyToSave,
    Committed,
    Abandoned,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Abandoned)
    }
}

/// What the user should be asked next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    AskName,
    AskSchedule { name: String },
    ConfirmSave { name: String, schedule: String },
    /// The session already ended
    Closed,
}

/// Outcome of [`ConversationSession::revert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reverted {
    /// Moved back one step
    Moved(Prompt),
    /// Nothing earlier to go back to; state untouched
    NoOp(Prompt),
}

#[derive(Debug)]
pub enum CommitResult {
    Committed,
    Failed(ReminderError),
}

pub struct ConversationSession {
    chat: ChatId,
    state: SessionState,
    name: Option<String>,
    schedule: Option<String>,
    store: Arc<ReminderStore>,
    compiler: Arc<dyn ScheduleCompiler>,
}

impl ConversationSession {
    pub fn new(chat: ChatId, store: Arc<ReminderStore>, compiler: Arc<dyn ScheduleCompiler>) -> Self {
        Self {
            chat,
            state: SessionState::AwaitingName,
            name: None,
            schedule: None,
            store,
            compiler,
        }
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref()
    }

    /// Prompt matching the current state
    pub fn prompt(&self) -> Prompt {
        match self.state {
            SessionState::AwaitingName => Prompt::AskName,
            SessionState::AwaitingSchedule => Prompt::AskSchedule {
                name: self.name.clone().unwrap_or_default(),
            },
            SessionState::ReadyToSave => Prompt::ConfirmSave {
                name: self.name.clone().unwrap_or_default(),
                schedule: self.schedule.clone().unwrap_or_default(),
            },
            SessionState::Committed | SessionState::Abandoned => Prompt::Closed,
        }
    }

    /// Consume the next reply. Validation errors leave the state unchanged.
    pub fn advance(&mut self, input: &str) -> Result<Prompt, ReminderError> {
        match self.state {
            SessionState::AwaitingName => {
                let name = input.trim();
                if name.is_empty() {
                    return Err(ReminderError::InvalidName(NameRejection::Empty));
                }
                if self.store.contains(self.chat, name) {
                    return Err(ReminderError::InvalidName(NameRejection::Duplicate(
                        name.to_string(),
                    )));
                }
                self.name = Some(name.to_string());
                self.state = SessionState::AwaitingSchedule;
                debug!("Chat {} named reminder '{name}'", self.chat);
            }
            SessionState::AwaitingSchedule => {
                let expression = input.trim();
                self.compiler.compile(expression)?;
                self.schedule = Some(expression.to_string());
                self.state = SessionState::ReadyToSave;
                debug!("Chat {} set schedule '{expression}'", self.chat);
            }
            // Nothing left to collect; keep asking for the save keyword
            SessionState::ReadyToSave => {}
            SessionState::Committed | SessionState::Abandoned => {
                return Err(ReminderError::NoActiveSession)
            }
        }
        Ok(self.prompt())
    }

    /// Step back one state, forgetting the field collected there.
    pub fn revert(&mut self) -> Reverted {
        match self.state {
            SessionState::AwaitingName => return Reverted::NoOp(Prompt::AskName),
            SessionState::AwaitingSchedule => {
                self.name = None;
                self.schedule = None;
                self.state = SessionState::AwaitingName;
            }
            SessionState::ReadyToSave => {
                self.schedule = None;
                self.state = SessionState::AwaitingSchedule;
            }
            SessionState::Committed | SessionState::Abandoned => {
                return Reverted::NoOp(Prompt::Closed)
            }
        }
        Reverted::Moved(self.prompt())
    }

    /// Write the collected reminder to the store.
    ///
    /// Outside `ReadyToSave` nothing happens and the current prompt comes back
    /// as the error. A failed write leaves the session in `ReadyToSave`.
    pub fn commit(&mut self) -> Result<CommitResult, Prompt> {
        if self.state != SessionState::ReadyToSave {
            return Err(self.prompt());
        }
        let (Some(name), Some(schedule)) = (self.name.clone(), self.schedule.clone()) else {
            return Err(self.prompt());
        };

        let item = ReminderItem::new(name.clone(), schedule);
        match self.store.insert(self.chat, &name, item) {
            Ok(()) => {
                self.state = SessionState::Committed;
                info!("Chat {} committed reminder '{name}'", self.chat);
                Ok(CommitResult::Committed)
            }
            Err(e) => {
                warn!("Chat {} failed to commit reminder '{name}': {e}", self.chat);
                Ok(CommitResult::Failed(e))
            }
        }
    }

    pub fn cancel(&mut self) {
        self.state = SessionState::Abandoned;
        debug!("Chat {} abandoned reminder setup", self.chat);
    }
}

/// Owns at most one live session per chat
pub struct SessionRegistry {
    sessions: DashMap<ChatId, ConversationSession>,
    store: Arc<ReminderStore>,
    compiler: Arc<dyn ScheduleCompiler>,
}

impl SessionRegistry {
    pub fn new(store: Arc<ReminderStore>, compiler: Arc<dyn ScheduleCompiler>) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
            compiler,
        }
    }

    /// Start a fresh session, discarding any unsaved one for the chat
    pub fn begin(&self, chat: ChatId) -> Prompt {
        let session = ConversationSession::new(chat, self.store.clone(), self.compiler.clone());
        let prompt = session.prompt();
        if self.sessions.insert(chat, session).is_some() {
            info!("Chat {chat} restarted reminder setup, discarding previous progress");
        } else {
            info!("Chat {chat} started reminder setup");
        }
        prompt
    }

    pub fn is_active(&self, chat: ChatId) -> bool {
        self.sessions.contains_key(&chat)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run `f` against the chat's session while holding its entry lock
    pub fn with_session<R>(
        &self,
        chat: ChatId,
        f: impl FnOnce(&mut ConversationSession) -> R,
    ) -> Option<R> {
        self.sessions.get_mut(&chat).map(|mut session| f(&mut session))
    }

    /// Cancel and drop the chat's session. False if there was none.
    pub fn cancel(&self, chat: ChatId) -> bool {
        match self.sessions.remove(&chat) {
            Some((_, mut session)) => {
                session.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the chat's session so it can be worked on without holding the
    /// map lock. Hand it back with [`SessionRegistry::restore`].
    pub fn take(&self, chat: ChatId) -> Option<ConversationSession> {
        self.sessions.remove(&chat).map(|(_, session)| session)
    }

    /// Put a taken session back. Terminal sessions are dropped, and a session
    /// begun for the chat in the meantime wins. True if it was reinstated.
    pub fn restore(&self, session: ConversationSession) -> bool {
        let chat = session.chat();
        if session.state().is_terminal() {
            return false;
        }
        match self.sessions.entry(chat) {
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
            Entry::Occupied(_) => {
                debug!("Chat {chat} restarted setup while saving, dropping the older session");
                false
            }
        }
    }
}
