// Collection store over a pluggable key-value backend

use chrono::{DateTime, Duration, SubsecRound, Utc};
use eyre::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::alert::{Alert, LogAlert, quota_message};
use crate::backend::{Backend, FileBackend, MemoryBackend, SqliteBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::{BackendKind, Config, DEFAULT_SIZE_WARNING_BYTES};
use crate::error::StoreError;
use crate::models::{Client, FileAttachment, PomodoroSettings, Project, Task, TimeEntry};
use crate::patch::{ClientPatch, FilePatch, ProjectPatch, TaskPatch, TimeEntryPatch};
use crate::record::{Entity, keys};
use crate::schema::{Stored, decode_records};

/// Whole-collection store: every call reads, modifies and rewrites one key
///
/// Reads never fail: a missing or unreadable collection comes back empty.
/// Writes that hit the backend quota raise an alert and return the error.
pub struct Store {
    backend: Box<dyn Backend>,
    clock: Box<dyn Clock>,
    alert: Box<dyn Alert>,
    size_warning_bytes: u64,
}

impl Store {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            clock: Box::new(SystemClock),
            alert: Box::new(LogAlert),
            size_warning_bytes: DEFAULT_SIZE_WARNING_BYTES,
        }
    }

    /// Open the backend named by `config`
    pub fn open(config: &Config) -> Result<Self> {
        let store = match config.backend {
            BackendKind::Files => {
                let backend = FileBackend::open(config.store_dir(), config.quota_bytes)
                    .context("Failed to open store directory")?;
                Self::new(backend)
            }
            BackendKind::Sqlite => {
                let backend = SqliteBackend::open(config.database_path(), config.quota_bytes)
                    .context("Failed to open SQLite database")?;
                Self::new(backend)
            }
            BackendKind::Memory => Self::new(match config.quota_bytes {
                Some(quota) => MemoryBackend::with_quota(quota),
                None => MemoryBackend::new(),
            }),
        };

        info!(backend = ?config.backend, dir = ?config.data_dir, "Opened store");
        Ok(store.with_size_warning(config.size_warning_bytes))
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_alert(mut self, alert: impl Alert + 'static) -> Self {
        self.alert = Box::new(alert);
        self
    }

    pub fn with_size_warning(mut self, bytes: u64) -> Self {
        self.size_warning_bytes = bytes;
        self
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // ========================================================================
    // Generic collection API
    // ========================================================================

    /// Load a whole collection, upgrading older record shapes
    pub fn list<T: Entity>(&self) -> Vec<T> {
        self.load::<T>().into_iter().filter_map(Stored::into_record).collect()
    }

    pub fn get<T: Entity>(&self, id: &str) -> Option<T> {
        self.list::<T>().into_iter().find(|r| r.id() == id)
    }

    /// Replace a whole collection
    pub fn save_all<T: Entity>(&mut self, records: &[T]) -> Result<(), StoreError> {
        self.write_value(T::storage_key(), records)
    }

    pub fn add<T: Entity>(&mut self, record: T) -> Result<(), StoreError> {
        let mut stored = self.load::<T>();
        stored.push(Stored::Record(record));
        self.save_stored::<T>(&stored)
    }

    /// Merge `patch` into the record with `id` and stamp `updatedAt`
    ///
    /// Returns `false` without writing when no record has that id.
    pub fn update<T: Entity>(&mut self, id: &str, patch: T::Patch) -> Result<bool, StoreError> {
        let mut stored = self.load::<T>();
        let Some(record) = stored
            .iter_mut()
            .filter_map(Stored::record_mut)
            .find(|r| r.id() == id)
        else {
            debug!(key = T::storage_key(), id, "update: no record with id");
            return Ok(false);
        };

        let stamp = self.next_stamp(record.updated_at());
        record.apply(patch);
        record.set_updated_at(stamp);

        self.save_stored::<T>(&stored)?;
        Ok(true)
    }

    /// Remove the record with `id`; returns whether one was removed
    pub fn delete<T: Entity>(&mut self, id: &str) -> Result<bool, StoreError> {
        let mut stored = self.load::<T>();
        let before = stored.len();
        stored.retain(|s| s.record().is_none_or(|r| r.id() != id));

        if stored.len() == before {
            debug!(key = T::storage_key(), id, "delete: no record with id");
            return Ok(false);
        }

        self.save_stored::<T>(&stored)?;
        Ok(true)
    }

    /// Stored collection with unreadable records kept in their slots
    pub(crate) fn load<T: Entity>(&self) -> Vec<Stored<T>> {
        match self.read_value::<Vec<Value>>(T::storage_key()) {
            Some(values) => decode_records(values),
            None => Vec::new(),
        }
    }

    /// Write back a collection read with [`Store::load`]
    pub(crate) fn save_stored<T: Entity>(&mut self, stored: &[Stored<T>]) -> Result<(), StoreError> {
        self.write_value(T::storage_key(), stored)
    }

    /// Millisecond timestamp strictly after `previous`
    pub(crate) fn next_stamp(&self, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = self.clock.now().trunc_subsecs(3);
        match previous {
            Some(prev) if now <= prev => prev.trunc_subsecs(3) + Duration::milliseconds(1),
            _ => now,
        }
    }

    // ========================================================================
    // Raw key access
    // ========================================================================

    /// Read and parse one key; absent or unreadable values come back as `None`
    pub(crate) fn read_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read from storage, using default");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Stored value is not valid, using default");
                None
            }
        }
    }

    /// Serialize and write one key
    ///
    /// Quota failures alert the user before the error is returned, so a
    /// caller that already updated its view knows the write did not land.
    pub(crate) fn write_value<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = to_json(key, value)?;
        self.warn_if_large(key, json.len() as u64);

        match self.backend.set(key, &json) {
            Ok(()) => {
                debug!(key, bytes = json.len(), "Saved collection");
                Ok(())
            }
            Err(e) => Err(self.report(key, e)),
        }
    }

    /// Write several keys as one unit
    ///
    /// The quota is checked for the whole batch before anything is written.
    /// If a write still fails, keys already written get their old values back.
    pub(crate) fn write_batch(&mut self, batch: &[(&'static str, String)]) -> Result<(), StoreError> {
        let mut previous = Vec::with_capacity(batch.len());
        for (key, _) in batch {
            previous.push(self.backend.get(key)?);
        }

        if let Some(quota) = self.backend.quota() {
            let replaced: u64 = previous.iter().flatten().map(|v| v.len() as u64).sum();
            let incoming: u64 = batch.iter().map(|(_, json)| json.len() as u64).sum();
            let needed = self.backend.used_bytes()?.saturating_sub(replaced) + incoming;
            if needed > quota {
                let key = batch.iter().map(|(key, _)| *key).collect::<Vec<_>>().join(",");
                let e = StoreError::QuotaExceeded { key, needed, quota };
                error!(needed, quota, "Storage quota exceeded for batch");
                self.alert.alert(&quota_message("imported data"));
                return Err(e);
            }
        }

        for (index, (key, json)) in batch.iter().enumerate() {
            self.warn_if_large(key, json.len() as u64);
            if let Err(e) = self.backend.set(key, json) {
                let e = self.report(key, e);
                self.restore(&batch[..index], &previous[..index]);
                return Err(e);
            }
        }

        debug!(keys = batch.len(), "Saved batch");
        Ok(())
    }

    fn restore(&mut self, written: &[(&'static str, String)], previous: &[Option<String>]) {
        for ((key, _), old) in written.iter().zip(previous) {
            let result = match old {
                Some(old) => self.backend.set(key, old),
                None => self.backend.remove(key),
            };
            if let Err(e) = result {
                error!(key, error = %e, "Failed to restore previous value");
            }
        }
    }

    fn warn_if_large(&self, key: &str, size: u64) {
        if size > self.size_warning_bytes {
            warn!(
                key,
                bytes = size,
                threshold = self.size_warning_bytes,
                "Collection is getting large, consider exporting and pruning old data"
            );
        }
    }

    /// Log a failed write, alerting on quota errors
    fn report(&self, key: &str, e: StoreError) -> StoreError {
        if e.is_quota() {
            error!(key, error = %e, "Storage quota exceeded");
            self.alert.alert(&quota_message(collection_label(key)));
        } else {
            error!(key, error = %e, "Failed to save to storage");
        }
        e
    }

    // ========================================================================
    // Projects
    // ========================================================================

    pub fn get_projects(&self) -> Vec<Project> {
        self.list()
    }

    pub fn save_projects(&mut self, projects: &[Project]) -> Result<(), StoreError> {
        self.save_all(projects)
    }

    pub fn add_project(&mut self, project: Project) -> Result<(), StoreError> {
        self.add(project)
    }

    pub fn update_project(&mut self, id: &str, patch: ProjectPatch) -> Result<bool, StoreError> {
        self.update::<Project>(id, patch)
    }

    pub fn delete_project(&mut self, id: &str) -> Result<bool, StoreError> {
        self.delete::<Project>(id)
    }

    // ========================================================================
    // Clients
    // ========================================================================

    pub fn get_clients(&self) -> Vec<Client> {
        self.list()
    }

    pub fn save_clients(&mut self, clients: &[Client]) -> Result<(), StoreError> {
        self.save_all(clients)
    }

    pub fn add_client(&mut self, client: Client) -> Result<(), StoreError> {
        self.add(client)
    }

    pub fn update_client(&mut self, id: &str, patch: ClientPatch) -> Result<bool, StoreError> {
        self.update::<Client>(id, patch)
    }

    pub fn delete_client(&mut self, id: &str) -> Result<bool, StoreError> {
        self.delete::<Client>(id)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub fn get_tasks(&self) -> Vec<Task> {
        self.list()
    }

    pub fn save_tasks(&mut self, tasks: &[Task]) -> Result<(), StoreError> {
        self.save_all(tasks)
    }

    pub fn add_task(&mut self, task: Task) -> Result<(), StoreError> {
        self.add(task)
    }

    pub fn update_task(&mut self, id: &str, patch: TaskPatch) -> Result<bool, StoreError> {
        self.update::<Task>(id, patch)
    }

    pub fn delete_task(&mut self, id: &str) -> Result<bool, StoreError> {
        self.delete::<Task>(id)
    }

    // ========================================================================
    // Time entries
    // ========================================================================

    pub fn get_time_entries(&self) -> Vec<TimeEntry> {
        self.list()
    }

    pub fn save_time_entries(&mut self, entries: &[TimeEntry]) -> Result<(), StoreError> {
        self.save_all(entries)
    }

    pub fn add_time_entry(&mut self, entry: TimeEntry) -> Result<(), StoreError> {
        self.add(entry)
    }

    pub fn update_time_entry(&mut self, id: &str, patch: TimeEntryPatch) -> Result<bool, StoreError> {
        self.update::<TimeEntry>(id, patch)
    }

    pub fn delete_time_entry(&mut self, id: &str) -> Result<bool, StoreError> {
        self.delete::<TimeEntry>(id)
    }

    // ========================================================================
    // Files
    // ========================================================================

    pub fn get_files(&self) -> Vec<FileAttachment> {
        self.list()
    }

    pub fn save_files(&mut self, files: &[FileAttachment]) -> Result<(), StoreError> {
        self.save_all(files)
    }

    pub fn add_file(&mut self, file: FileAttachment) -> Result<(), StoreError> {
        self.add(file)
    }

    pub fn update_file(&mut self, id: &str, patch: FilePatch) -> Result<bool, StoreError> {
        self.update::<FileAttachment>(id, patch)
    }

    pub fn delete_file(&mut self, id: &str) -> Result<bool, StoreError> {
        self.delete::<FileAttachment>(id)
    }

    // ========================================================================
    // Pomodoro settings
    // ========================================================================

    pub fn get_pomodoro_settings(&self) -> PomodoroSettings {
        self.read_value(keys::POMODORO_SETTINGS).unwrap_or_default()
    }

    pub fn save_pomodoro_settings(&mut self, settings: &PomodoroSettings) -> Result<(), StoreError> {
        self.write_value(keys::POMODORO_SETTINGS, settings)
    }
}

/// Human name for a storage key, used in alerts
pub(crate) fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })
}

fn collection_label(key: &str) -> &str {
    match key {
        keys::PROJECTS => "projects",
        keys::CLIENTS => "clients",
        keys::TASKS => "tasks",
        keys::TIME_ENTRIES => "time entries",
        keys::FILES => "files",
        keys::POMODORO_SETTINGS => "Pomodoro settings",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::CollectingAlert;
    use crate::clock::FixedClock;
    use crate::models::{Contact, KanbanStatus, TaskStatus};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()
    }

    fn memory_store() -> (Store, Rc<FixedClock>) {
        let clock = Rc::new(FixedClock::on(day(), 9));
        let store = Store::new(MemoryBackend::new()).with_clock(Rc::clone(&clock));
        (store, clock)
    }

    #[test]
    fn test_empty_collections_default() {
        let (store, _) = memory_store();
        assert!(store.get_projects().is_empty());
        assert!(store.get_files().is_empty());
        assert_eq!(store.get_pomodoro_settings(), PomodoroSettings::default());
    }

    #[test]
    fn test_corrupt_collection_reads_empty() {
        let mut backend = MemoryBackend::new();
        backend.set(keys::TASKS, "{not json").unwrap();
        backend.set(keys::POMODORO_SETTINGS, "42").unwrap();
        let store = Store::new(backend);

        assert!(store.get_tasks().is_empty());
        assert_eq!(store.get_pomodoro_settings(), PomodoroSettings::default());
    }

    #[test]
    fn test_add_then_get() {
        let (mut store, clock) = memory_store();
        store.add_task(Task::new("t1", "First", clock.now())).unwrap();
        store.add_task(Task::new("t2", "Second", clock.now())).unwrap();

        let tasks = store.get_tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "t1");
        assert_eq!(store.get::<Task>("t2").unwrap().title, "Second");
    }

    #[test]
    fn test_update_merges_and_stamps() {
        let (mut store, clock) = memory_store();
        let project = Project::new("p1", "Site", clock.now());
        store.add_project(project.clone()).unwrap();

        clock.advance(Duration::minutes(5));
        let updated = store
            .update_project("p1", ProjectPatch::status(KanbanStatus::Review))
            .unwrap();
        assert!(updated);

        let stored = store.get::<Project>("p1").unwrap();
        assert_eq!(stored.status, KanbanStatus::Review);
        assert_eq!(stored.name, project.name);
        assert_eq!(stored.updated_at, clock.now());
        assert!(stored.updated_at > project.updated_at);
    }

    #[test]
    fn test_update_stamp_strictly_increases_without_clock_moving() {
        let (mut store, clock) = memory_store();
        store.add_task(Task::new("t1", "x", clock.now())).unwrap();

        store.update_task("t1", TaskPatch::complete(clock.now())).unwrap();
        let first = store.get::<Task>("t1").unwrap().updated_at.unwrap();

        store.update_task("t1", TaskPatch::reopen()).unwrap();
        let second = store.get::<Task>("t1").unwrap().updated_at.unwrap();

        assert!(second > first);
        assert_eq!(store.get::<Task>("t1").unwrap().status, TaskStatus::Todo);
    }

    #[test]
    fn test_update_missing_id_is_noop() {
        let (mut store, clock) = memory_store();
        store.add_task(Task::new("t1", "x", clock.now())).unwrap();
        let before = store.backend().get(keys::TASKS).unwrap();

        assert!(!store.update_task("nope", TaskPatch::reopen()).unwrap());
        assert_eq!(store.backend().get(keys::TASKS).unwrap(), before);
    }

    #[test]
    fn test_delete_removes_only_match() {
        let (mut store, clock) = memory_store();
        for id in ["a", "b", "c"] {
            store
                .add_client(Client::new(id, id.to_uppercase(), Contact::named("x"), clock.now()))
                .unwrap();
        }
        let before = store.get_clients();

        assert!(store.delete_client("b").unwrap());
        assert!(!store.delete_client("b").unwrap());

        let after = store.get_clients();
        assert_eq!(after, vec![before[0].clone(), before[2].clone()]);
    }

    #[test]
    fn test_quota_error_alerts_and_propagates() {
        let alerts = Rc::new(CollectingAlert::new());
        let (store, clock) = memory_store();
        let mut store = Store {
            backend: Box::new(MemoryBackend::with_quota(400)),
            ..store
        }
        .with_alert(Rc::clone(&alerts));

        store.add_task(Task::new("t1", "fits", clock.now())).unwrap();
        let stored = store.backend().get(keys::TASKS).unwrap();

        let big = Task::new("t2", "x".repeat(1000), clock.now());
        let err = store.add_task(big).unwrap_err();
        assert!(err.is_quota());

        assert_eq!(store.backend().get(keys::TASKS).unwrap(), stored);
        let messages = alerts.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("tasks"));
    }

    #[test]
    fn test_unreadable_record_survives_unrelated_writes() {
        let (store, clock) = memory_store();
        let odd = json!({"id": "t2", "title": "odd", "priority": "urgent", "createdAt": "2024-04-01T09:00:00.000Z"});
        let raw = json!([
            {"id": "t1", "title": "ok", "createdAt": "2024-04-01T09:00:00.000Z"},
            odd.clone(),
        ]);
        let mut backend = MemoryBackend::new();
        backend.set(keys::TASKS, &raw.to_string()).unwrap();
        let mut store = Store { backend: Box::new(backend), ..store };

        assert_eq!(store.get_tasks().len(), 1);
        store.add_task(Task::new("t3", "new", clock.now())).unwrap();
        store.update_task("t1", TaskPatch::complete(clock.now())).unwrap();
        assert!(store.delete_task("t3").unwrap());

        let stored: Vec<Value> = serde_json::from_str(&store.backend().get(keys::TASKS).unwrap().unwrap()).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["id"], "t1");
        assert_eq!(stored[1], odd);
    }

    #[test]
    fn test_unknown_fields_survive_sibling_delete() {
        let (store, _) = memory_store();
        let p1 = json!({
            "id": "p1",
            "name": "Site",
            "description": "",
            "status": "review",
            "createdAt": "2023-01-01T10:00:00.000Z",
            "updatedAt": "2023-01-02T10:00:00.000Z",
            "isInternal": false,
            "isArchived": false,
            "order": 3
        });
        let p2 = json!({"id": "p2", "name": "Logo", "createdAt": "2023-01-01T10:00:00.000Z", "updatedAt": "2023-01-01T10:00:00.000Z"});
        let mut backend = MemoryBackend::new();
        backend.set(keys::PROJECTS, &json!([p1.clone(), p2]).to_string()).unwrap();
        let mut store = Store { backend: Box::new(backend), ..store };

        assert!(store.delete_project("p2").unwrap());

        let stored: Vec<Value> = serde_json::from_str(&store.backend().get(keys::PROJECTS).unwrap().unwrap()).unwrap();
        assert_eq!(stored, vec![p1]);
    }

    /// Memory backend whose writes to one key always fail
    struct FailOn {
        inner: MemoryBackend,
        key: &'static str,
    }

    impl Backend for FailOn {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            if key == self.key {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source: std::io::Error::other("disk unavailable"),
                });
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }

        fn used_bytes(&self) -> Result<u64, StoreError> {
            self.inner.used_bytes()
        }

        fn quota(&self) -> Option<u64> {
            self.inner.quota()
        }
    }

    #[test]
    fn test_write_batch_puts_back_old_values_on_failure() {
        let mut inner = MemoryBackend::new();
        inner.set(keys::PROJECTS, "[]").unwrap();
        let mut store = Store::new(FailOn { inner, key: keys::FILES });

        let batch = vec![
            (keys::PROJECTS, "[{}]".to_string()),
            (keys::TASKS, "[]".to_string()),
            (keys::FILES, "[]".to_string()),
        ];
        let err = store.write_batch(&batch).unwrap_err();
        assert!(!err.is_quota());

        assert_eq!(store.backend().get(keys::PROJECTS).unwrap().as_deref(), Some("[]"));
        assert_eq!(store.backend().get(keys::TASKS).unwrap(), None);
    }

    #[test]
    fn test_write_batch_checks_quota_up_front() {
        let alerts = Rc::new(CollectingAlert::new());
        let mut store = Store::new(MemoryBackend::with_quota(10)).with_alert(Rc::clone(&alerts));

        let batch = vec![
            (keys::PROJECTS, "[]".to_string()),
            (keys::FILES, "x".repeat(20)),
        ];
        assert!(store.write_batch(&batch).unwrap_err().is_quota());
        assert_eq!(store.backend().get(keys::PROJECTS).unwrap(), None);
        assert_eq!(alerts.messages().len(), 1);
    }

    #[test]
    fn test_pomodoro_settings_roundtrip() {
        let (mut store, _) = memory_store();
        let settings = PomodoroSettings {
            work_duration: 50,
            break_duration: 10,
            long_break_duration: 30,
            sessions_until_long_break: 3,
        };
        store.save_pomodoro_settings(&settings).unwrap();
        assert_eq!(store.get_pomodoro_settings(), settings);
    }

    #[test]
    fn test_open_files_backend() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        let mut store = Store::open(&config).unwrap();

        store.add_task(Task::new("t1", "persisted", Utc::now())).unwrap();
        assert!(temp.path().join("store").join("psk_tasks.json").exists());

        let reopened = Store::open(&config).unwrap();
        assert_eq!(reopened.get_tasks().len(), 1);
    }

    #[test]
    fn test_open_sqlite_backend() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::load(temp.path()).unwrap();
        config.backend = BackendKind::Sqlite;

        let mut store = Store::open(&config).unwrap();
        store.add_task(Task::new("t1", "persisted", Utc::now())).unwrap();
        assert!(temp.path().join("pskstore.db").exists());

        let reopened = Store::open(&config).unwrap();
        assert_eq!(reopened.get_tasks()[0].title, "persisted");
    }
}
