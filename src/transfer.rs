// Export and import of every collection as one JSON document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ImportError, StoreError};
use crate::models::{Client, FileAttachment, PomodoroSettings, Project, Task, TimeEntry};
use crate::record::{Entity, keys};
use crate::schema::{timestamp, upgrade_records};
use crate::store::{Store, to_json};

/// Version tag written into every export
pub const EXPORT_VERSION: &str = "1.0";

/// Backup file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub projects: Vec<Project>,
    pub clients: Vec<Client>,
    pub tasks: Vec<Task>,
    pub time_entries: Vec<TimeEntry>,
    pub files: Vec<FileAttachment>,
    pub pomodoro_settings: PomodoroSettings,
    #[serde(with = "timestamp")]
    pub export_date: DateTime<Utc>,
    pub version: String,
}

/// What an import replaced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub version: String,
    /// Export field names of the collections that were overwritten
    pub replaced: Vec<&'static str>,
    pub records: usize,
    /// Records no known shape accepted
    pub skipped: usize,
}

/// Everything decoded from an import document, ready to write
#[derive(Default)]
struct Staged {
    projects: Option<Vec<Project>>,
    clients: Option<Vec<Client>>,
    tasks: Option<Vec<Task>>,
    time_entries: Option<Vec<TimeEntry>>,
    files: Option<Vec<FileAttachment>>,
    pomodoro_settings: Option<PomodoroSettings>,
}

impl Store {
    pub fn export_document(&self) -> ExportDocument {
        ExportDocument {
            projects: self.get_projects(),
            clients: self.get_clients(),
            tasks: self.get_tasks(),
            time_entries: self.get_time_entries(),
            files: self.get_files(),
            pomodoro_settings: self.get_pomodoro_settings(),
            export_date: self.clock().now(),
            version: EXPORT_VERSION.to_string(),
        }
    }

    /// Pretty-printed backup of all collections
    pub fn export_all_data(&self) -> Result<String, StoreError> {
        let document = self.export_document();
        info!(
            projects = document.projects.len(),
            clients = document.clients.len(),
            tasks = document.tasks.len(),
            time_entries = document.time_entries.len(),
            files = document.files.len(),
            "Exporting all data"
        );

        serde_json::to_string_pretty(&document).map_err(|source| StoreError::Serialize {
            key: "export".to_string(),
            source,
        })
    }

    /// Restore a backup produced by [`Store::export_all_data`] or an older version
    ///
    /// The whole document is parsed and upgraded before anything is written.
    /// Each collection present replaces the stored one; absent or `null`
    /// collections are left untouched.
    pub fn import_all_data(&mut self, json: &str) -> Result<ImportSummary, ImportError> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(mut document) = value else {
            return Err(ImportError::WrongType {
                field: "document",
                expected: "an object",
            });
        };

        let version = match document.get("version") {
            None | Some(Value::Null) => return Err(ImportError::MissingVersion),
            Some(Value::String(s)) if s.trim().is_empty() => return Err(ImportError::MissingVersion),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        let mut summary = ImportSummary {
            version,
            ..ImportSummary::default()
        };

        let staged = Staged {
            projects: stage::<Project>(&mut document, &mut summary)?,
            clients: stage::<Client>(&mut document, &mut summary)?,
            tasks: stage::<Task>(&mut document, &mut summary)?,
            time_entries: stage::<TimeEntry>(&mut document, &mut summary)?,
            files: stage::<FileAttachment>(&mut document, &mut summary)?,
            pomodoro_settings: stage_settings(&mut document, &mut summary)?,
        };

        self.write_batch(&staged.into_batch()?)?;

        info!(
            version = %summary.version,
            replaced = ?summary.replaced,
            records = summary.records,
            skipped = summary.skipped,
            "Import complete"
        );
        Ok(summary)
    }
}

impl Staged {
    /// Serialized collections to write, in a fixed key order
    fn into_batch(self) -> Result<Vec<(&'static str, String)>, StoreError> {
        let mut batch = Vec::new();
        push::<Project>(&mut batch, self.projects)?;
        push::<Client>(&mut batch, self.clients)?;
        push::<Task>(&mut batch, self.tasks)?;
        push::<TimeEntry>(&mut batch, self.time_entries)?;
        push::<FileAttachment>(&mut batch, self.files)?;
        if let Some(settings) = self.pomodoro_settings {
            batch.push((keys::POMODORO_SETTINGS, to_json(keys::POMODORO_SETTINGS, &settings)?));
        }
        Ok(batch)
    }
}

fn push<T: Entity>(batch: &mut Vec<(&'static str, String)>, records: Option<Vec<T>>) -> Result<(), StoreError> {
    if let Some(records) = records {
        let key = T::storage_key();
        batch.push((key, to_json(key, &records)?));
    }
    Ok(())
}

fn stage<T: Entity>(
    document: &mut Map<String, Value>,
    summary: &mut ImportSummary,
) -> Result<Option<Vec<T>>, ImportError> {
    let field = T::export_field();
    let values = match document.remove(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(values)) => values,
        Some(_) => {
            return Err(ImportError::WrongType {
                field,
                expected: "an array",
            });
        }
    };

    let total = values.len();
    let records: Vec<T> = upgrade_records(values);
    if records.len() < total {
        warn!(field, skipped = total - records.len(), "Import skipped unreadable records");
    }

    summary.replaced.push(field);
    summary.records += records.len();
    summary.skipped += total - records.len();
    Ok(Some(records))
}

fn stage_settings(
    document: &mut Map<String, Value>,
    summary: &mut ImportSummary,
) -> Result<Option<PomodoroSettings>, ImportError> {
    const FIELD: &str = "pomodoroSettings";

    match document.remove(FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let settings = serde_json::from_value(value).map_err(|_| ImportError::WrongType {
                field: FIELD,
                expected: "an object with workDuration, breakDuration, longBreakDuration and sessionsUntilLongBreak",
            })?;
            summary.replaced.push(FIELD);
            Ok(Some(settings))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::CollectingAlert;
    use crate::backend::MemoryBackend;
    use crate::clock::FixedClock;
    use crate::models::Contact;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::rc::Rc;

    fn store() -> Store {
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(), 12);
        Store::new(MemoryBackend::new()).with_clock(clock)
    }

    #[test]
    fn test_export_has_every_field() {
        let store = store();
        let json: Value = serde_json::from_str(&store.export_all_data().unwrap()).unwrap();

        for field in [
            "projects",
            "clients",
            "tasks",
            "timeEntries",
            "files",
            "pomodoroSettings",
            "exportDate",
            "version",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["version"], EXPORT_VERSION);
        assert_eq!(json["pomodoroSettings"]["workDuration"], 25);
    }

    #[test]
    fn test_export_is_pretty_printed() {
        let exported = store().export_all_data().unwrap();
        assert!(exported.contains("\n  \"projects\""));
    }

    #[test]
    fn test_import_rejects_missing_version() {
        let mut store = store();
        let now = store.clock().now();
        store.add_task(Task::new("t1", "keep me", now)).unwrap();

        let err = store.import_all_data(r#"{"tasks": []}"#).unwrap_err();
        assert!(matches!(err, ImportError::MissingVersion));
        assert_eq!(store.get_tasks().len(), 1);
    }

    #[test]
    fn test_import_rejects_bad_json_without_writing() {
        let mut store = store();
        let err = store.import_all_data("{\"version\": ").unwrap_err();
        assert!(matches!(err, ImportError::InvalidJson(_)));
        assert_eq!(store.backend().used_bytes().unwrap(), 0);
    }

    #[test]
    fn test_import_wrong_type_writes_nothing() {
        let mut store = store();
        let doc = json!({
            "version": "1.0",
            "projects": [],
            "tasks": {"not": "an array"}
        });
        let err = store.import_all_data(&doc.to_string()).unwrap_err();
        assert!(matches!(err, ImportError::WrongType { field: "tasks", .. }));
        assert_eq!(store.backend().get(keys::PROJECTS).unwrap(), None);
    }

    #[test]
    fn test_import_leaves_absent_collections() {
        let mut store = store();
        let now = store.clock().now();
        store
            .add_client(Client::new("c1", "Acme", Contact::named("Ada"), now))
            .unwrap();

        let doc = json!({"version": "1.0", "tasks": [], "clients": null});
        let summary = store.import_all_data(&doc.to_string()).unwrap();

        assert_eq!(summary.replaced, vec!["tasks"]);
        assert_eq!(store.get_clients().len(), 1);
    }

    #[test]
    fn test_import_upgrades_legacy_records() {
        let mut store = store();
        let doc = json!({
            "version": "1.0",
            "clients": [
                {"id": "c1", "name": "Acme", "email": "a@acme.test", "createdAt": "2023-01-01T00:00:00.000Z", "updatedAt": "2023-01-01T00:00:00.000Z"},
                {"garbage": 1}
            ]
        });

        let summary = store.import_all_data(&doc.to_string()).unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(summary.skipped, 1);

        let clients = store.get_clients();
        assert_eq!(clients[0].contacts[0].email.as_deref(), Some("a@acme.test"));
    }

    #[test]
    fn test_import_over_quota_changes_nothing() {
        let alerts = Rc::new(CollectingAlert::new());
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(), 12);
        let mut store = Store::new(MemoryBackend::with_quota(2_000))
            .with_clock(clock)
            .with_alert(Rc::clone(&alerts));
        let now = store.clock().now();
        store.add_project(Project::new("p1", "Keep me", now)).unwrap();
        let before = store.backend().get(keys::PROJECTS).unwrap();

        let scan = FileAttachment::from_bytes("f1", "p2", "scan.pdf", &[7u8; 4096], now);
        let doc = json!({
            "version": "1.0",
            "projects": [Project::new("p2", "Replacement", now)],
            "tasks": [],
            "files": [scan]
        });

        let err = store.import_all_data(&doc.to_string()).unwrap_err();
        assert!(matches!(err, ImportError::Storage(ref e) if e.is_quota()));
        assert_eq!(alerts.messages().len(), 1);

        assert_eq!(store.backend().get(keys::PROJECTS).unwrap(), before);
        assert_eq!(store.backend().get(keys::TASKS).unwrap(), None);
        assert!(store.get_files().is_empty());
    }

    #[test]
    fn test_import_bad_settings_rejected() {
        let mut store = store();
        let doc = json!({"version": "1.0", "pomodoroSettings": {"workDuration": "long"}});
        assert!(store.import_all_data(&doc.to_string()).is_err());
        assert_eq!(store.backend().get(keys::POMODORO_SETTINGS).unwrap(), None);
    }
}
