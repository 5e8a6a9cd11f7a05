// pskstore - Local project desk store: collections, backups, schema upgrades, daily rollover

pub mod alert;
pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod patch;
pub mod pomodoro;
pub mod query;
pub mod record;
pub mod rollover;
pub mod schema;
pub mod store;
pub mod transfer;

// Re-export main types for convenience
pub use alert::{Alert, CollectingAlert, LogAlert};
pub use backend::{Backend, FileBackend, MemoryBackend, SqliteBackend};
pub use clock::{Clock, FixedClock, SystemClock, generate_id, now_ms};
pub use config::{BackendKind, Config};
pub use error::{ImportError, StoreError};
pub use models::{
    Client, ClientLink, Contact, FileAttachment, KanbanStatus, PomodoroSettings, Priority, Project, Task, TaskStatus,
    TimeEntry,
};
pub use patch::{ClientPatch, FilePatch, ProjectPatch, TaskPatch, TimeEntryPatch};
pub use record::{Entity, keys};
pub use rollover::Rollover;
pub use store::Store;
pub use transfer::{EXPORT_VERSION, ExportDocument, ImportSummary};
