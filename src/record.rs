// Entity trait tying each model to its collection

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::models::{Client, FileAttachment, Project, Task, TimeEntry};
use crate::patch::{ClientPatch, FilePatch, ProjectPatch, TaskPatch, TimeEntryPatch};
use crate::schema::ClientShape;

/// Fixed storage keys, one per collection
pub mod keys {
    pub const PROJECTS: &str = "psk_projects";
    pub const CLIENTS: &str = "psk_clients";
    pub const TASKS: &str = "psk_tasks";
    pub const TIME_ENTRIES: &str = "psk_time_entries";
    pub const FILES: &str = "psk_files";
    pub const POMODORO_SETTINGS: &str = "psk_pomodoro_settings";
    pub const LAST_DAILY_CHECK: &str = "psk_last_daily_check";

    pub const ALL: [&str; 7] = [
        PROJECTS,
        CLIENTS,
        TASKS,
        TIME_ENTRIES,
        FILES,
        POMODORO_SETTINGS,
        LAST_DAILY_CHECK,
    ];
}

/// Core trait for a record kept in an id-addressed collection
pub trait Entity: Serialize + DeserializeOwned + Clone + 'static {
    /// Union of the shapes this record was written in over time
    type Shape: DeserializeOwned + Into<Self>;

    /// Typed partial update
    type Patch: DeserializeOwned + Default + std::fmt::Debug;

    fn id(&self) -> &str;

    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// Only the store calls this; patches cannot carry `updatedAt`
    fn set_updated_at(&mut self, at: DateTime<Utc>);

    fn apply(&mut self, patch: Self::Patch);

    /// Key the whole collection is stored under
    fn storage_key() -> &'static str;

    /// Field name in the export document
    fn export_field() -> &'static str;
}

impl Entity for Project {
    type Shape = Project;
    type Patch = ProjectPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn apply(&mut self, patch: ProjectPatch) {
        patch.apply_to(self);
    }

    fn storage_key() -> &'static str {
        keys::PROJECTS
    }

    fn export_field() -> &'static str {
        "projects"
    }
}

impl Entity for Client {
    type Shape = ClientShape;
    type Patch = ClientPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn apply(&mut self, patch: ClientPatch) {
        patch.apply_to(self);
    }

    fn storage_key() -> &'static str {
        keys::CLIENTS
    }

    fn export_field() -> &'static str {
        "clients"
    }
}

impl Entity for Task {
    type Shape = Task;
    type Patch = TaskPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    fn apply(&mut self, patch: TaskPatch) {
        patch.apply_to(self);
    }

    fn storage_key() -> &'static str {
        keys::TASKS
    }

    fn export_field() -> &'static str {
        "tasks"
    }
}

impl Entity for TimeEntry {
    type Shape = TimeEntry;
    type Patch = TimeEntryPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    fn apply(&mut self, patch: TimeEntryPatch) {
        patch.apply_to(self);
    }

    fn storage_key() -> &'static str {
        keys::TIME_ENTRIES
    }

    fn export_field() -> &'static str {
        "timeEntries"
    }
}

impl Entity for FileAttachment {
    type Shape = FileAttachment;
    type Patch = FilePatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    fn apply(&mut self, patch: FilePatch) {
        patch.apply_to(self);
    }

    fn storage_key() -> &'static str {
        keys::FILES
    }

    fn export_field() -> &'static str {
        "files"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entity_keys_are_distinct() {
        let mut all = vec![
            Project::storage_key(),
            Client::storage_key(),
            Task::storage_key(),
            TimeEntry::storage_key(),
            FileAttachment::storage_key(),
        ];
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|k| keys::ALL.contains(k)));
    }

    #[test]
    fn test_task_gains_updated_at() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut task = Task::new("t1", "x", now);
        assert_eq!(Entity::updated_at(&task), None);

        task.set_updated_at(now);
        assert_eq!(Entity::updated_at(&task), Some(now));
        assert_eq!(Entity::id(&task), "t1");
    }
}
