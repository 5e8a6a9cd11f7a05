// Typed partial updates, one struct per entity
//
// A field left out of the JSON is left alone. For optional fields, an
// explicit `null` clears the value. Unknown keys are rejected.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use crate::models::{
    Client, Contact, FileAttachment, KanbanStatus, Priority, Project, Task, TaskStatus, TimeEntry,
};

/// Present-but-null becomes `Some(None)`; absent stays `None` via `default`
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn nullable_date<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    crate::schema::opt_date_field::deserialize(deserializer).map(Some)
}

fn required_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    crate::schema::date_field::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub client_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub client_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub client_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub client_phone: Option<Option<String>>,
    pub status: Option<KanbanStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub color: Option<Option<String>>,
    pub is_internal: Option<bool>,
    pub is_archived: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub proton_drive_link: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_date")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

impl ProjectPatch {
    pub fn status(status: KanbanStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn archived(is_archived: bool) -> Self {
        Self {
            is_archived: Some(is_archived),
            ..Self::default()
        }
    }

    pub fn apply_to(self, project: &mut Project) {
        set(&mut project.name, self.name);
        set(&mut project.description, self.description);
        set(&mut project.client_id, self.client_id);
        set(&mut project.client_name, self.client_name);
        set(&mut project.client_email, self.client_email);
        set(&mut project.client_phone, self.client_phone);
        set(&mut project.status, self.status);
        set(&mut project.color, self.color);
        set(&mut project.is_internal, self.is_internal);
        set(&mut project.is_archived, self.is_archived);
        set(&mut project.proton_drive_link, self.proton_drive_link);
        set(&mut project.due_date, self.due_date);
        set(&mut project.notes, self.notes);
    }
}

/// Client update; `email`/`phone` are the first-generation form and land on
/// the primary contact
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientPatch {
    pub name: Option<String>,
    pub contacts: Option<Vec<Contact>>,
    #[serde(default, deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub logo: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub color_palette: Option<Option<Vec<String>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

impl ClientPatch {
    pub fn apply_to(self, client: &mut Client) {
        set(&mut client.name, self.name);
        set(&mut client.contacts, self.contacts);

        if self.email.is_some() || self.phone.is_some() {
            if client.contacts.is_empty() {
                client.contacts.push(Contact::named(client.name.clone()));
            }
            let primary = &mut client.contacts[0];
            set(&mut primary.email, self.email);
            set(&mut primary.phone, self.phone);
        }

        set(&mut client.logo, self.logo);
        set(&mut client.color_palette, self.color_palette);
        set(&mut client.notes, self.notes);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default, deserialize_with = "nullable")]
    pub project_id: Option<Option<String>>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable_date")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub is_daily: Option<bool>,
    #[serde(default, deserialize_with = "nullable_date")]
    pub missed_date: Option<Option<NaiveDate>>,
}

impl TaskPatch {
    /// Mark done at `at`
    pub fn complete(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            completed_at: Some(Some(at)),
            ..Self::default()
        }
    }

    /// Back to todo, clearing the completion time
    pub fn reopen() -> Self {
        Self {
            status: Some(TaskStatus::Todo),
            completed_at: Some(None),
            ..Self::default()
        }
    }

    pub fn missed(on: NaiveDate) -> Self {
        Self {
            missed_date: Some(Some(on)),
            ..Self::default()
        }
    }

    pub fn apply_to(self, task: &mut Task) {
        set(&mut task.project_id, self.project_id);
        set(&mut task.title, self.title);
        set(&mut task.description, self.description);
        set(&mut task.status, self.status);
        set(&mut task.priority, self.priority);
        set(&mut task.due_date, self.due_date);
        set(&mut task.completed_at, self.completed_at);
        set(&mut task.is_daily, self.is_daily);
        set(&mut task.missed_date, self.missed_date);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeEntryPatch {
    pub project_id: Option<String>,
    pub description: Option<String>,
    pub duration: Option<u32>,
    #[serde(default, deserialize_with = "required_date")]
    pub date: Option<NaiveDate>,
}

impl TimeEntryPatch {
    pub fn apply_to(self, entry: &mut TimeEntry) {
        set(&mut entry.project_id, self.project_id);
        set(&mut entry.description, self.description);
        set(&mut entry.duration, self.duration);
        set(&mut entry.date, self.date);
    }
}

/// Attachments are immutable apart from their name and owning project
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilePatch {
    pub project_id: Option<String>,
    pub name: Option<String>,
}

impl FilePatch {
    pub fn apply_to(self, file: &mut FileAttachment) {
        set(&mut file.project_id, self.project_id);
        set(&mut file.name, self.name);
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}
