//! Durable chat → name → reminder mapping.
//!
//! The whole document is read on load and rewritten on every change. Writes
//! go to a sibling temp file that is synced and renamed over the original,
//! so a crash never leaves a truncated store behind.

use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ChatId, ReminderItem, Snapshot};
use crate::core::{NameRejection, ReminderError};

pub struct ReminderStore {
    path: PathBuf,
    /// Last state known to be on disk
    committed: Mutex<Snapshot>,
}

impl ReminderStore {
    /// Open the store at `path` and load whatever is already persisted.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ReminderError> {
        let store = Self::unloaded(path);
        store.load()?;
        Ok(store)
    }

    /// Create a handle without touching the filesystem; call [`load`](Self::load) before use.
    pub fn unloaded(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            committed: Mutex::new(Snapshot::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the document from disk. A missing file is an empty store.
    ///
    /// On failure the previously loaded snapshot is kept.
    pub fn load(&self) -> Result<Snapshot, ReminderError> {
        let mut committed = self.lock();
        let snapshot = read_document(&self.path)?;
        *committed = snapshot.clone();
        debug!(
            "Loaded {} reminders for {} chats from {}",
            snapshot.values().map(BTreeMap::len).sum::<usize>(),
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    /// Read-only copy of the last persisted state
    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    pub fn contains(&self, chat: ChatId, name: &str) -> bool {
        self.lock()
            .get(&chat)
            .is_some_and(|reminders| reminders.contains_key(name))
    }

    /// Committed reminders for one chat, ordered by name
    pub fn reminders_for(&self, chat: ChatId) -> Vec<(String, ReminderItem)> {
        self.lock()
            .get(&chat)
            .map(|reminders| {
                reminders
                    .iter()
                    .map(|(name, item)| (name.clone(), item.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert or overwrite one reminder and persist.
    pub fn upsert(&self, chat: ChatId, name: &str, item: ReminderItem) -> Result<(), ReminderError> {
        self.mutate(|snapshot| {
            snapshot
                .entry(chat)
                .or_default()
                .insert(name.to_string(), item);
            Ok(())
        })?;
        info!("Saved reminder '{name}' for chat {chat}");
        Ok(())
    }

    /// Insert one reminder, refusing to overwrite an existing name.
    ///
    /// The uniqueness check runs against the on-disk document under the
    /// store lock, so two sessions racing for the same name cannot both win.
    pub fn insert(&self, chat: ChatId, name: &str, item: ReminderItem) -> Result<(), ReminderError> {
        self.mutate(|snapshot| {
            let reminders = snapshot.entry(chat).or_default();
            if reminders.contains_key(name) {
                return Err(ReminderError::InvalidName(NameRejection::Duplicate(
                    name.to_string(),
                )));
            }
            reminders.insert(name.to_string(), item);
            Ok(())
        })?;
        info!("Added reminder '{name}' for chat {chat}");
        Ok(())
    }

    /// Delete one reminder. Returns false if it did not exist.
    pub fn remove(&self, chat: ChatId, name: &str) -> Result<bool, ReminderError> {
        let mut removed = false;
        self.mutate(|snapshot| {
            if let Some(reminders) = snapshot.get_mut(&chat) {
                removed = reminders.remove(name).is_some();
                if reminders.is_empty() {
                    snapshot.remove(&chat);
                }
            }
            Ok(())
        })?;
        if removed {
            info!("Removed reminder '{name}' for chat {chat}");
        }
        Ok(removed)
    }

    /// Merge a change into the current on-disk document and persist it.
    /// The in-memory snapshot only advances once the write has landed.
    fn mutate<F>(&self, change: F) -> Result<(), ReminderError>
    where
        F: FnOnce(&mut Snapshot) -> Result<(), ReminderError>,
    {
        let mut committed = self.lock();
        let mut next = read_document(&self.path)?;
        change(&mut next)?;
        write_document(&self.path, &next)?;
        *committed = next;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.committed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_document(path: &Path) -> Result<Snapshot, ReminderError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::new()),
        Err(e) => return Err(e.into()),
    };

    if raw.trim().is_empty() {
        return Ok(Snapshot::new());
    }

    serde_json::from_str(&raw).map_err(|source| ReminderError::CorruptStore {
        path: path.to_path_buf(),
        source,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_document(path: &Path, snapshot: &Snapshot) -> Result<(), ReminderError> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    replace_via_temp(path, |file| file.write_all(json.as_bytes()))?;

    debug!("Persisted reminder store to {}", path.display());
    Ok(())
}

/// Fill a sibling temp file, sync it and rename it over `path`. The temp
/// file is removed on every failure after it was created.
fn replace_via_temp(
    path: &Path,
    fill: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> io::Result<()> {
    let tmp_path = temp_path(path);
    let mut file = fs::File::create(&tmp_path)?;

    let written = fill(&mut file).and_then(|()| file.sync_all());
    drop(file);

    let result = written.and_then(|()| fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
