// Read-only views over loaded collections

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use crate::clock::Clock;
use crate::models::{Client, ClientLink, FileAttachment, KanbanStatus, Project, Task, TimeEntry};

/// Projects due within this many days count as due soon
pub const DUE_SOON_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct BoardColumn<'a> {
    pub status: KanbanStatus,
    pub projects: Vec<&'a Project>,
}

/// Unarchived projects grouped into board columns, in column order
pub fn board(projects: &[Project]) -> Vec<BoardColumn<'_>> {
    KanbanStatus::ALL
        .iter()
        .map(|&status| BoardColumn {
            status,
            projects: projects
                .iter()
                .filter(|p| !p.is_archived && p.status == status)
                .collect(),
        })
        .collect()
}

/// `(active, archived)`
pub fn split_archived(projects: &[Project]) -> (Vec<&Project>, Vec<&Project>) {
    projects.iter().partition(|p| !p.is_archived)
}

/// Clients whose name or any contact matches; a blank query matches all
pub fn search_clients<'a>(clients: &'a [Client], query: &str) -> Vec<&'a Client> {
    let query = query.trim();
    clients
        .iter()
        .filter(|c| query.is_empty() || c.matches(query))
        .collect()
}

/// Projects linked to `client` by id, or by name when they predate client ids
pub fn client_projects<'a>(client: &Client, projects: &'a [Project]) -> Vec<&'a Project> {
    projects
        .iter()
        .filter(|p| match p.client_id.as_deref() {
            Some(id) => id == client.id,
            None => p.client_name.as_deref() == Some(client.name.as_str()),
        })
        .collect()
}

/// Display name of a project's client
pub fn client_display_name<'a>(project: &'a Project, clients: &'a [Client]) -> Option<&'a str> {
    match project.client_link() {
        ClientLink::Reference(id) => clients
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
            .or(project.client_name.as_deref()),
        ClientLink::Inline { name, .. } => Some(name),
        ClientLink::Unassigned => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Overdue,
    DueSoon,
    Upcoming,
}

pub fn urgency(due: NaiveDate, today: NaiveDate) -> Urgency {
    let days = (due - today).num_days();
    if days < 0 {
        Urgency::Overdue
    } else if days <= DUE_SOON_DAYS {
        Urgency::DueSoon
    } else {
        Urgency::Upcoming
    }
}

/// Unarchived projects with a due date, keyed by that date
pub fn due_dates(projects: &[Project]) -> BTreeMap<NaiveDate, Vec<&Project>> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&Project>> = BTreeMap::new();
    for project in projects.iter().filter(|p| !p.is_archived) {
        if let Some(due) = project.due_date {
            by_date.entry(due).or_default().push(project);
        }
    }
    by_date
}

/// Calendar month slice of [`due_dates`]
pub fn month_due_dates(projects: &[Project], year: i32, month: u32) -> BTreeMap<NaiveDate, Vec<&Project>> {
    due_dates(projects)
        .into_iter()
        .filter(|(date, _)| date.year() == year && date.month() == month)
        .collect()
}

/// Daily tasks still open, plus those completed today
pub fn daily_tasks<'a>(tasks: &'a [Task], clock: &dyn Clock) -> Vec<&'a Task> {
    let today = clock.today();
    tasks
        .iter()
        .filter(|t| t.is_daily)
        .filter(|t| match t.completed_at {
            None => true,
            Some(done) => clock.local_date(done) == today,
        })
        .collect()
}

/// Daily tasks flagged by rollover and still not done
pub fn missed_tasks(tasks: &[Task]) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|t| t.is_daily && t.missed_date.is_some() && !t.is_completed())
        .collect()
}

pub fn project_tasks<'a>(tasks: &'a [Task], project_id: &str) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|t| t.project_id.as_deref() == Some(project_id))
        .collect()
}

pub fn project_time_entries<'a>(entries: &'a [TimeEntry], project_id: &str) -> Vec<&'a TimeEntry> {
    entries.iter().filter(|e| e.project_id == project_id).collect()
}

pub fn project_files<'a>(files: &'a [FileAttachment], project_id: &str) -> Vec<&'a FileAttachment> {
    files.iter().filter(|f| f.project_id == project_id).collect()
}

/// Hours logged against a project
pub fn tracked_hours(entries: &[TimeEntry], project_id: &str) -> f64 {
    let minutes: u64 = project_time_entries(entries, project_id)
        .iter()
        .map(|e| u64::from(e.duration))
        .sum();
    minutes as f64 / 60.0
}

/// `1.5 MB`-style size
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let rounded = (size * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
