//! Keeps one live firing task per persisted reminder.
//!
//! [`ReminderScheduler::reconcile`] diffs the store against the running task
//! registry and only starts or stops the difference. Calling it again with
//! no store change does nothing.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::dispatcher::NotificationDispatcher;
use super::schedule::{ScheduleCompiler, Timetable};
use super::store::ReminderStore;
use super::{ChatId, ReminderItem};
use crate::core::ReminderError;

/// Identity of a scheduled task: names are only unique within a chat
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub chat: ChatId,
    pub name: String,
}

impl TaskKey {
    pub fn new(chat: ChatId, name: impl Into<String>) -> Self {
        Self {
            chat,
            name: name.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat, self.name)
    }
}

/// Public view of a running task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// Unique per started instance; a restart yields a new id
    pub id: Uuid,
    pub item: ReminderItem,
}

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<TaskKey>,
    pub stopped: Vec<TaskKey>,
    pub replaced: Vec<TaskKey>,
    pub unchanged: usize,
}

impl ReconcileReport {
    /// True when no task was started or stopped
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.replaced.is_empty()
    }
}

struct ScheduledTask {
    id: Uuid,
    item: ReminderItem,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Abort the timer and wait for it to unwind, so no firing can follow
    async fn stop(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

pub struct ReminderScheduler {
    store: Arc<ReminderStore>,
    compiler: Arc<dyn ScheduleCompiler>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    tasks: Mutex<HashMap<TaskKey, ScheduledTask>>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<ReminderStore>,
        compiler: Arc<dyn ScheduleCompiler>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            compiler,
            dispatcher,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Align running tasks with the persisted reminders.
    ///
    /// If the store cannot be read the running tasks are left exactly as
    /// they were and the error is returned.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ReminderError> {
        let mut tasks = self.tasks.lock().await;

        let snapshot = self.store.load().map_err(|e| {
            error!("Reconciliation aborted, keeping {} running tasks: {e}", tasks.len());
            e
        })?;

        let desired: HashMap<TaskKey, ReminderItem> = snapshot
            .into_iter()
            .flat_map(|(chat, reminders)| {
                reminders
                    .into_iter()
                    .map(move |(name, item)| (TaskKey::new(chat, name), item))
            })
            .collect();

        let mut report = ReconcileReport::default();

        let stale: Vec<TaskKey> = tasks
            .keys()
            .filter(|key| !desired.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(task) = tasks.remove(&key) {
                task.stop().await;
                info!("Stopped reminder task {key}");
                report.stopped.push(key);
            }
        }

        for (key, item) in desired {
            let existing = tasks.get(&key).map(|task| &task.item);
            if existing == Some(&item) {
                report.unchanged += 1;
                continue;
            }
            let replacing = existing.is_some();

            let timetable = match self.compiler.compile(&item.schedule) {
                Ok(timetable) => timetable,
                Err(e) => {
                    error!("Skipping reminder {key}: {e}");
                    continue;
                }
            };

            if let Some(old) = tasks.remove(&key) {
                old.stop().await;
            }
            let task = self.spawn(key.clone(), item, timetable);
            if replacing {
                info!("Replaced reminder task {key} ({})", task.item.schedule);
                report.replaced.push(key.clone());
            } else {
                info!("Started reminder task {key} ({})", task.item.schedule);
                report.started.push(key.clone());
            }
            tasks.insert(key, task);
        }

        debug!(
            "Reconciled reminders: {} started, {} replaced, {} stopped, {} unchanged",
            report.started.len(),
            report.replaced.len(),
            report.stopped.len(),
            report.unchanged
        );
        Ok(report)
    }

    /// Snapshot of the task registry
    pub async fn running(&self) -> BTreeMap<TaskKey, TaskInfo> {
        self.tasks
            .lock()
            .await
            .iter()
            .map(|(key, task)| {
                (
                    key.clone(),
                    TaskInfo {
                        id: task.id,
                        item: task.item.clone(),
                    },
                )
            })
            .collect()
    }

    /// Stop every running task
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        let count = tasks.len();
        for (_, task) in tasks.drain() {
            task.stop().await;
        }
        info!("Stopped {count} reminder tasks");
    }

    fn spawn(&self, key: TaskKey, item: ReminderItem, timetable: Arc<dyn Timetable>) -> ScheduledTask {
        let id = Uuid::new_v4();
        let handle = tokio::spawn(fire_on_schedule(
            key,
            item.text.clone(),
            timetable,
            self.dispatcher.clone(),
        ));
        ScheduledTask { id, item, handle }
    }
}

async fn fire_on_schedule(
    key: TaskKey,
    text: String,
    timetable: Arc<dyn Timetable>,
    dispatcher: Arc<dyn NotificationDispatcher>,
) {
    let mut last_fired: Option<DateTime<Utc>> = None;
    loop {
        let now = Utc::now();
        // Never fire the same occurrence twice if the timer wakes a hair early
        let from = last_fired.map_or(now, |last| last.max(now));
        let Some(next) = timetable.next_after(from) else {
            info!("Reminder {key} has no further occurrences");
            return;
        };

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        last_fired = Some(next);

        debug!("Firing reminder {key}");
        if let Err(e) = dispatcher.send(key.chat, &text).await {
            warn!("Failed to deliver reminder {key}: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reminders::dispatcher::testing::RecordingDispatcher;
    use crate::features::reminders::schedule::testing::IntervalCompiler;
    use crate::features::reminders::schedule::CronCompiler;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        store: Arc<ReminderStore>,
        dispatcher: Arc<RecordingDispatcher>,
        scheduler: ReminderScheduler,
    }

    fn fixture_with(compiler: Arc<dyn ScheduleCompiler>) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ReminderStore::open(tmp.path().join("reminders.json")).unwrap());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let scheduler = ReminderScheduler::new(store.clone(), compiler, dispatcher.clone());
        Fixture {
            _tmp: tmp,
            store,
            dispatcher,
            scheduler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(CronCompiler))
    }

    #[tokio::test]
    async fn test_reconcile_starts_desired_tasks() {
        let fx = fixture();
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "0 */2 * * *")).unwrap();
        fx.store.upsert(7, "Drink Water", ReminderItem::new("Drink Water", "0 */2 * * *")).unwrap();

        let report = fx.scheduler.reconcile().await.unwrap();
        assert_eq!(report.started.len(), 2);
        assert!(report.stopped.is_empty());

        let running = fx.scheduler.running().await;
        assert!(running.contains_key(&TaskKey::new(42, "Drink Water")));
        assert!(running.contains_key(&TaskKey::new(7, "Drink Water")));
        fx.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let fx = fixture();
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "0 */2 * * *")).unwrap();

        fx.scheduler.reconcile().await.unwrap();
        let before = fx.scheduler.running().await;

        let report = fx.scheduler.reconcile().await.unwrap();
        assert!(report.is_noop());
        assert_eq!(report.unchanged, 1);
        assert_eq!(fx.scheduler.running().await, before);
        fx.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_changed_item_is_replaced_and_others_untouched() {
        let fx = fixture();
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "0 */2 * * *")).unwrap();
        fx.store.upsert(42, "Stretch", ReminderItem::new("Stretch", "0 9 * * *")).unwrap();
        fx.scheduler.reconcile().await.unwrap();
        let before = fx.scheduler.running().await;

        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "30 * * * *")).unwrap();
        let report = fx.scheduler.reconcile().await.unwrap();
        assert_eq!(report.replaced, vec![TaskKey::new(42, "Drink Water")]);
        assert_eq!(report.unchanged, 1);

        let after = fx.scheduler.running().await;
        assert_eq!(after.len(), 2);
        let water = TaskKey::new(42, "Drink Water");
        let stretch = TaskKey::new(42, "Stretch");
        assert_ne!(after[&water].id, before[&water].id);
        assert_eq!(after[&water].item.schedule, "30 * * * *");
        assert_eq!(after[&stretch].id, before[&stretch].id);
        fx.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_removed_item_is_stopped() {
        let fx = fixture();
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "0 */2 * * *")).unwrap();
        fx.scheduler.reconcile().await.unwrap();

        fx.store.remove(42, "Drink Water").unwrap();
        let report = fx.scheduler.reconcile().await.unwrap();
        assert_eq!(report.stopped, vec![TaskKey::new(42, "Drink Water")]);
        assert!(fx.scheduler.running().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_store_leaves_tasks_running() {
        let fx = fixture();
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "0 */2 * * *")).unwrap();
        fx.scheduler.reconcile().await.unwrap();
        let before = fx.scheduler.running().await;

        std::fs::write(fx.store.path(), "{{{").unwrap();
        let err = fx.scheduler.reconcile().await.err().unwrap();
        assert!(matches!(err, ReminderError::CorruptStore { .. }));
        assert_eq!(fx.scheduler.running().await, before);
        fx.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_uncompilable_item_skipped() {
        let fx = fixture();
        fx.store.upsert(42, "Broken", ReminderItem::new("Broken", "notacron")).unwrap();
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "0 */2 * * *")).unwrap();

        let report = fx.scheduler.reconcile().await.unwrap();
        assert_eq!(report.started, vec![TaskKey::new(42, "Drink Water")]);
        assert_eq!(fx.scheduler.running().await.len(), 1);
        fx.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_running_task_survives_uncompilable_edit() {
        let fx = fixture();
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "0 */2 * * *")).unwrap();
        fx.scheduler.reconcile().await.unwrap();
        let before = fx.scheduler.running().await;

        // Hand edit of the document that breaks the cron
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "notacron")).unwrap();
        let report = fx.scheduler.reconcile().await.unwrap();
        assert!(report.stopped.is_empty());
        assert!(report.replaced.is_empty());
        assert!(report.started.is_empty());

        let after = fx.scheduler.running().await;
        let water = TaskKey::new(42, "Drink Water");
        assert_eq!(after[&water].id, before[&water].id);
        assert_eq!(after[&water].item.schedule, "0 */2 * * *");
        fx.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_tasks_fire_and_survive_dispatch_failures() {
        let fx = fixture_with(Arc::new(IntervalCompiler));
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "@every 20ms")).unwrap();
        fx.dispatcher.set_failing(true);

        fx.scheduler.reconcile().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let attempts = fx.dispatcher.sent_to(42);
        assert!(attempts.len() >= 2, "expected repeated firings, got {}", attempts.len());
        assert!(attempts.iter().all(|text| text == "Drink Water"));
        fx.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_firing_after_stop() {
        let fx = fixture_with(Arc::new(IntervalCompiler));
        fx.store.upsert(42, "Drink Water", ReminderItem::new("Drink Water", "@every 10ms")).unwrap();
        fx.scheduler.reconcile().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        fx.store.remove(42, "Drink Water").unwrap();
        fx.scheduler.reconcile().await.unwrap();
        let count = fx.dispatcher.sent().len();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fx.dispatcher.sent().len(), count);
    }
}
