// Domain models for the project desk collections

use chrono::{DateTime, NaiveDate, Utc};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{date_field, opt_date_field, opt_timestamp, timestamp};

/// Board column a project sits in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KanbanStatus {
    #[default]
    Backlog,
    InProgress,
    Review,
    Completed,
}

impl KanbanStatus {
    /// Board columns, left to right
    pub const ALL: [KanbanStatus; 4] = [
        KanbanStatus::Backlog,
        KanbanStatus::InProgress,
        KanbanStatus::Review,
        KanbanStatus::Completed,
    ];

    pub fn title(self) -> &'static str {
        match self {
            KanbanStatus::Backlog => "Backlog",
            KanbanStatus::InProgress => "In Progress",
            KanbanStatus::Review => "Review",
            KanbanStatus::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for KanbanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KanbanStatus::Backlog => write!(f, "backlog"),
            KanbanStatus::InProgress => write!(f, "in-progress"),
            KanbanStatus::Review => write!(f, "review"),
            KanbanStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::InProgress => write!(f, "in-progress"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// A client engagement tracked on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Legacy inline client fields, superseded by `client_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub status: KanbanStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub is_internal: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proton_drive_link: Option<String>,
    #[serde(default, with = "opt_date_field", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Keys this version does not model, kept so rewrites do not drop them
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Who a project belongs to, resolved with `client_id` taking precedence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLink<'a> {
    Reference(&'a str),
    Inline {
        name: &'a str,
        email: Option<&'a str>,
        phone: Option<&'a str>,
    },
    Unassigned,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            client_id: None,
            client_name: None,
            client_email: None,
            client_phone: None,
            status: KanbanStatus::Backlog,
            created_at: now,
            updated_at: now,
            color: None,
            is_internal: false,
            is_archived: false,
            proton_drive_link: None,
            due_date: None,
            notes: None,
            extra: Map::new(),
        }
    }

    pub fn client_link(&self) -> ClientLink<'_> {
        if let Some(id) = self.client_id.as_deref().filter(|id| !id.is_empty()) {
            return ClientLink::Reference(id);
        }
        match self.client_name.as_deref().filter(|name| !name.trim().is_empty()) {
            Some(name) => ClientLink::Inline {
                name,
                email: self.client_email.as_deref(),
                phone: self.client_phone.as_deref(),
            },
            None => ClientLink::Unassigned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Contact {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub contacts: Vec<Contact>,
    /// Embedded image as a data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// Brand colors as `#rrggbb`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_palette: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Client {
    pub fn new(id: impl Into<String>, name: impl Into<String>, contact: Contact, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            contacts: vec![contact],
            logo: None,
            color_palette: None,
            notes: None,
            created_at: now,
            updated_at: now,
            extra: Map::new(),
        }
    }

    /// Form-level rules: a non-blank name, at least one named contact, hex colors
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(eyre!("Client name cannot be empty"));
        }
        if !self.contacts.iter().any(|c| !c.name.trim().is_empty()) {
            return Err(eyre!("At least one contact must have a name"));
        }
        if let Some(logo) = &self.logo {
            if !logo.starts_with("data:image/") {
                return Err(eyre!("Logo must be an image"));
            }
            let payload = logo.split_once(',').map(|(_, p)| p.len()).unwrap_or(0);
            if payload / 4 * 3 > MAX_LOGO_BYTES {
                return Err(eyre!("Logo must be smaller than 2MB"));
            }
        }
        for color in self.color_palette.iter().flatten() {
            if !is_hex_color(color) {
                return Err(eyre!("Invalid color: {} (expected #rrggbb)", color));
            }
        }
        Ok(())
    }

    /// Case-insensitive match on the client name or any contact field
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        let hit = |s: &str| s.to_lowercase().contains(&query);

        hit(&self.name)
            || self.contacts.iter().any(|c| {
                hit(&c.name) || c.email.as_deref().is_some_and(hit) || c.phone.as_deref().is_some_and(hit)
            })
    }
}

/// Largest logo image accepted by `Client::validate`
pub const MAX_LOGO_BYTES: usize = 2 * 1024 * 1024;

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, with = "opt_date_field", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_daily: bool,
    /// Day a daily task was left uncompleted
    #[serde(default, with = "opt_date_field", skip_serializing_if = "Option::is_none")]
    pub missed_date: Option<NaiveDate>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            project_id: None,
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            due_date: None,
            created_at: now,
            completed_at: None,
            is_daily: false,
            missed_date: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn daily(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            is_daily: true,
            ..Self::new(id, title, now)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub description: String,
    /// Minutes
    pub duration: u32,
    #[serde(with = "date_field")]
    pub date: NaiveDate,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub id: String,
    pub project_id: String,
    pub name: String,
    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Bytes
    pub size: u64,
    /// Data URL carrying the base64 payload
    pub url: String,
    #[serde(with = "timestamp")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileAttachment {
    /// Build an attachment carrying `bytes` as a base64 data URL
    pub fn from_bytes(
        id: impl Into<String>,
        project_id: impl Into<String>,
        name: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Self {
        let mime_type = mime_for(name);
        Self {
            id: id.into(),
            project_id: project_id.into(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
            url: format!("data:{};base64,{}", mime_type, B64.encode(bytes)),
            uploaded_at: now,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// Decode the embedded payload
    pub fn data(&self) -> Result<Vec<u8>> {
        let (_, payload) = self
            .url
            .split_once(";base64,")
            .ok_or_else(|| eyre!("Attachment {} is not a base64 data URL", self.id))?;
        B64.decode(payload)
            .map_err(|e| eyre!("Attachment {} has invalid base64: {}", self.id, e))
    }
}

/// MIME type guessed from a file name's extension
pub fn mime_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Pomodoro durations in minutes, plus the long-break cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroSettings {
    pub work_duration: u32,
    pub break_duration: u32,
    pub long_break_duration: u32,
    pub sessions_until_long_break: u32,
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            work_duration: 25,
            break_duration: 5,
            long_break_duration: 15,
            sessions_until_long_break: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&KanbanStatus::InProgress).unwrap(), "\"in-progress\"");
        assert_eq!(serde_json::to_string(&TaskStatus::Todo).unwrap(), "\"todo\"");
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    }

    #[test]
    fn test_project_wire_format_is_camel_case() {
        let mut project = Project::new("p1", "Site", ts());
        project.due_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        project.is_archived = true;

        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["dueDate"], "2024-06-01");
        assert_eq!(json["isArchived"], true);
        assert_eq!(json["createdAt"], "2024-05-01T09:00:00.000Z");
        assert!(json.get("clientId").is_none());
    }

    #[test]
    fn test_client_link_precedence() {
        let mut project = Project::new("p1", "Site", ts());
        assert_eq!(project.client_link(), ClientLink::Unassigned);

        project.client_name = Some("Acme".to_string());
        assert!(matches!(project.client_link(), ClientLink::Inline { name: "Acme", .. }));

        project.client_id = Some("c1".to_string());
        assert_eq!(project.client_link(), ClientLink::Reference("c1"));
    }

    #[test]
    fn test_client_validate() {
        let mut client = Client::new("c1", "Acme", Contact::named("Ada"), ts());
        assert!(client.validate().is_ok());

        client.contacts = vec![Contact::named("  ")];
        assert!(client.validate().is_err());

        client.contacts = vec![Contact::named(""), Contact::named("Bob")];
        assert!(client.validate().is_ok());

        client.color_palette = Some(vec!["#12ab9F".to_string(), "red".to_string()]);
        assert!(client.validate().is_err());
    }

    #[test]
    fn test_client_matches_contacts() {
        let mut client = Client::new("c1", "Acme", Contact::named("Ada"), ts());
        client.contacts.push(Contact {
            name: "Bob".to_string(),
            email: Some("BOB@example.com".to_string()),
            phone: Some("555-0100".to_string()),
        });

        assert!(client.matches("acme"));
        assert!(client.matches("bob@"));
        assert!(client.matches("0100"));
        assert!(!client.matches("zed"));
    }

    #[test]
    fn test_file_attachment_type_field() {
        let file = FileAttachment {
            id: "f1".to_string(),
            project_id: "p1".to_string(),
            name: "brief.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size: 12,
            url: "data:application/pdf;base64,AAAA".to_string(),
            uploaded_at: ts(),
            updated_at: None,
            extra: Default::default(),
        };
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["type"], "application/pdf");
    }

    #[test]
    fn test_file_attachment_from_bytes() {
        let file = FileAttachment::from_bytes("f1", "p1", "Logo.PNG", b"foobar", ts());
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.size, 6);
        assert_eq!(file.url, "data:image/png;base64,Zm9vYmFy");
        assert_eq!(file.data().unwrap(), b"foobar");
    }

    #[test]
    fn test_client_logo_must_be_image() {
        let mut client = Client::new("c1", "Acme", Contact::named("Ada"), ts());
        client.logo = Some("data:application/pdf;base64,AAAA".to_string());
        assert!(client.validate().is_err());

        client.logo = Some("data:image/png;base64,AAAA".to_string());
        assert!(client.validate().is_ok());
    }

    #[test]
    fn test_pomodoro_defaults() {
        let settings = PomodoroSettings::default();
        assert_eq!(settings.work_duration, 25);
        assert_eq!(settings.sessions_until_long_break, 4);
    }
}
