use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

use pskstore::pomodoro::{PomodoroCycle, PomodoroMode, format_clock};
use pskstore::query::{self, Urgency};
use pskstore::schema::date_field;
use pskstore::{
    BackendKind, Client, CollectingAlert, Config, Contact, Entity, FileAttachment, Priority, Project, Rollover, Store,
    Task, TaskPatch, TimeEntry, generate_id,
};

#[derive(Parser)]
#[command(name = "pskstore")]
#[command(about = "Local project desk: projects, clients, tasks, time tracking and backups")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Data directory (default: $PSK_DATA_DIR or the platform data dir)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Override the backend from config.yml
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a backup of every collection
    Export {
        /// Output file (default: stdout)
        output: Option<PathBuf>,
    },

    /// Restore collections from a backup file
    Import { file: PathBuf },

    /// Flag daily tasks left open on earlier days
    Rollover,

    /// List projects
    Projects {
        /// Show archived projects instead
        #[arg(long)]
        archived: bool,
    },

    /// One project with its tasks, tracked time and files
    Project { id: String },

    /// Projects by board column
    Board,

    /// List clients, optionally filtered by a search query
    Clients { query: Option<String> },

    /// List tasks
    Tasks {
        #[arg(long)]
        daily: bool,
        #[arg(long)]
        missed: bool,
    },

    AddProject {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        client: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
    },

    AddClient {
        name: String,
        /// Primary contact name (default: the client name)
        #[arg(long)]
        contact: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },

    AddTask {
        title: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, value_enum, default_value_t = PriorityArg::Medium)]
        priority: PriorityArg,
        #[arg(long)]
        daily: bool,
        /// YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
    },

    /// Log minutes against a project
    LogTime {
        project: String,
        minutes: u32,
        #[arg(long, default_value = "")]
        description: String,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Attach a file to a project
    Attach { project: String, path: PathBuf },

    /// Toggle a task between completed and todo
    Complete { id: String },

    /// Apply a JSON patch to one record
    Update {
        #[arg(value_enum)]
        collection: CollectionArg,
        id: String,
        /// e.g. '{"status":"review","dueDate":null}'
        patch: String,
    },

    Delete {
        #[arg(value_enum)]
        collection: CollectionArg,
        id: String,
    },

    /// Projects due in a month
    Calendar {
        /// YYYY-MM (default: this month)
        #[arg(long)]
        month: Option<String>,
    },

    /// Show or change Pomodoro settings
    Pomodoro {
        #[arg(long)]
        work: Option<u32>,
        #[arg(long = "break")]
        short_break: Option<u32>,
        #[arg(long)]
        long_break: Option<u32>,
        #[arg(long)]
        sessions: Option<u32>,
    },

    /// Dashboard counts
    Stats,

    /// Show or change config.yml
    Config {
        #[arg(long = "set-backend", value_enum)]
        set_backend: Option<BackendKind>,
        /// Storage quota in bytes
        #[arg(long)]
        quota: Option<u64>,
        /// Remove the storage quota
        #[arg(long, conflicts_with = "quota")]
        no_quota: bool,
        /// Collection size that triggers a warning, in bytes
        #[arg(long)]
        size_warning: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CollectionArg {
    Projects,
    Clients,
    Tasks,
    TimeEntries,
    Files,
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(pskstore::config::default_data_dir);

    if let Commands::Config {
        set_backend,
        quota,
        no_quota,
        size_warning,
    } = cli.command
    {
        return configure(&data_dir, set_backend, quota, no_quota, size_warning);
    }

    let mut config = Config::load(&data_dir)?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    let alerts = Rc::new(CollectingAlert::new());
    let mut store = Store::open(&config)?.with_alert(Rc::clone(&alerts));

    let result = run(cli.command, &mut store);

    // Alerts go to stderr so they are seen even with logging turned down
    for message in alerts.take() {
        eprintln!("{}", message.red().bold());
    }
    result
}

fn run(command: Commands, store: &mut Store) -> Result<()> {
    // Daily tasks are reconciled on every start
    if !matches!(command, Commands::Rollover) {
        if let Rollover::Reconciled { missed, .. } = store.run_daily_rollover()? {
            if !missed.is_empty() {
                eprintln!("{} {} daily task(s) marked missed", "!".yellow(), missed.len());
            }
        }
    }

    match command {
        Commands::Export { output } => {
            let json = store.export_all_data()?;
            match output {
                Some(path) => {
                    fs::write(&path, json).context("Failed to write export file")?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Import { file } => {
            let json = fs::read_to_string(&file).context("Failed to read import file")?;
            let summary = store.import_all_data(&json).context("Import failed")?;
            println!(
                "Imported {} record(s) from version {} backup ({})",
                summary.records,
                summary.version,
                summary.replaced.join(", ")
            );
            if summary.skipped > 0 {
                println!("{} {} unreadable record(s) skipped", "!".yellow(), summary.skipped);
            }
        }
        Commands::Rollover => match store.run_daily_rollover()? {
            Rollover::FirstRun { today } => println!("First daily check recorded for {}", today),
            Rollover::UpToDate => println!("Already checked today"),
            Rollover::Reconciled { since, missed, .. } => {
                println!("Reconciled since {}: {} missed", since, missed.len())
            }
        },
        Commands::Projects { archived } => {
            let projects = store.get_projects();
            let clients = store.get_clients();
            let (active, archived_list) = query::split_archived(&projects);
            let shown = if archived { archived_list } else { active };
            for project in shown {
                print_project(project, &clients, store);
            }
        }
        Commands::Project { id } => {
            let project = store
                .get::<Project>(&id)
                .ok_or_else(|| eyre!("No project with id {}", id))?;
            let clients = store.get_clients();
            print_project(&project, &clients, store);
            if !project.description.is_empty() {
                println!("  {}", project.description);
            }

            let tasks = store.get_tasks();
            let project_tasks = query::project_tasks(&tasks, &id);
            println!("{} ({})", "Tasks".bold(), project_tasks.len());
            for task in project_tasks {
                print!("  ");
                print_task(task);
            }

            let entries = store.get_time_entries();
            println!(
                "{} {:.2} h ({} time entries)",
                "Tracked".bold(),
                query::tracked_hours(&entries, &id),
                query::project_time_entries(&entries, &id).len()
            );

            let files = store.get_files();
            let project_files = query::project_files(&files, &id);
            println!("{} ({})", "Files".bold(), project_files.len());
            for file in project_files {
                println!("  {} {} {}", file.id.dimmed(), file.name, query::format_file_size(file.size).dimmed());
            }
        }
        Commands::Board => {
            let projects = store.get_projects();
            let clients = store.get_clients();
            for column in query::board(&projects) {
                println!("{} ({})", column.status.title().bold(), column.projects.len());
                for project in column.projects {
                    print!("  ");
                    print_project(project, &clients, store);
                }
            }
        }
        Commands::Clients { query: search } => {
            let clients = store.get_clients();
            let projects = store.get_projects();
            for client in query::search_clients(&clients, search.as_deref().unwrap_or("")) {
                let count = query::client_projects(client, &projects).len();
                println!("{} {} ({} project(s))", client.id.dimmed(), client.name.bold(), count);
                for contact in &client.contacts {
                    let details: Vec<&str> = [contact.email.as_deref(), contact.phone.as_deref()]
                        .into_iter()
                        .flatten()
                        .collect();
                    println!("    {} {}", contact.name, details.join(" / ").dimmed());
                }
            }
        }
        Commands::Tasks { daily, missed } => {
            let tasks = store.get_tasks();
            let shown: Vec<&Task> = if missed {
                query::missed_tasks(&tasks)
            } else if daily {
                query::daily_tasks(&tasks, store.clock())
            } else {
                tasks.iter().collect()
            };
            for task in shown {
                print_task(task);
            }
        }
        Commands::AddProject {
            name,
            description,
            client,
            due,
        } => {
            let mut project = Project::new(generate_id(), name, store.clock().now());
            project.description = description;
            project.client_id = client;
            project.due_date = due.as_deref().map(parse_date).transpose()?;
            let id = project.id.clone();
            store.add_project(project)?;
            println!("Created project {}", id);
        }
        Commands::AddClient {
            name,
            contact,
            email,
            phone,
        } => {
            let contact = Contact {
                name: contact.unwrap_or_else(|| name.clone()),
                email,
                phone,
            };
            let client = Client::new(generate_id(), name, contact, store.clock().now());
            client.validate()?;
            let id = client.id.clone();
            store.add_client(client)?;
            println!("Created client {}", id);
        }
        Commands::AddTask {
            title,
            project,
            priority,
            daily,
            due,
        } => {
            let mut task = Task::new(generate_id(), title, store.clock().now());
            task.project_id = project;
            task.priority = priority.into();
            task.is_daily = daily;
            task.due_date = due.as_deref().map(parse_date).transpose()?;
            let id = task.id.clone();
            store.add_task(task)?;
            println!("Created task {}", id);
        }
        Commands::LogTime {
            project,
            minutes,
            description,
            date,
        } => {
            let now = store.clock().now();
            let entry = TimeEntry {
                id: generate_id(),
                project_id: project.clone(),
                description,
                duration: minutes,
                date: match date {
                    Some(d) => parse_date(&d)?,
                    None => store.clock().today(),
                },
                created_at: now,
                updated_at: None,
                extra: Default::default(),
            };
            store.add_time_entry(entry)?;
            let hours = query::tracked_hours(&store.get_time_entries(), &project);
            println!("Logged {} min, {:.2} h total on {}", minutes, hours, project);
        }
        Commands::Attach { project, path } => {
            let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| eyre!("Invalid file name: {}", path.display()))?;
            let file = FileAttachment::from_bytes(generate_id(), &project, name, &bytes, store.clock().now());
            let size = file.size;
            store.add_file(file)?;
            println!("Attached {} ({})", path.display(), query::format_file_size(size));
        }
        Commands::Complete { id } => {
            let task = store
                .get::<Task>(&id)
                .ok_or_else(|| eyre!("No task with id {}", id))?;
            let patch = if task.is_completed() {
                TaskPatch::reopen()
            } else {
                TaskPatch::complete(store.clock().now())
            };
            store.update_task(&id, patch)?;
            println!("{} {}", if task.is_completed() { "Reopened" } else { "Completed" }, task.title);
        }
        Commands::Update { collection, id, patch } => {
            let found = match collection {
                CollectionArg::Projects => update_from_json::<Project>(store, &id, &patch)?,
                CollectionArg::Clients => update_from_json::<Client>(store, &id, &patch)?,
                CollectionArg::Tasks => update_from_json::<Task>(store, &id, &patch)?,
                CollectionArg::TimeEntries => update_from_json::<TimeEntry>(store, &id, &patch)?,
                CollectionArg::Files => update_from_json::<FileAttachment>(store, &id, &patch)?,
            };
            if !found {
                return Err(eyre!("No record with id {}", id));
            }
            println!("Updated {}", id);
        }
        Commands::Delete { collection, id } => {
            let removed = match collection {
                CollectionArg::Projects => store.delete::<Project>(&id)?,
                CollectionArg::Clients => store.delete::<Client>(&id)?,
                CollectionArg::Tasks => store.delete::<Task>(&id)?,
                CollectionArg::TimeEntries => store.delete::<TimeEntry>(&id)?,
                CollectionArg::Files => store.delete::<FileAttachment>(&id)?,
            };
            if !removed {
                return Err(eyre!("No record with id {}", id));
            }
            println!("Deleted {}", id);
        }
        Commands::Calendar { month } => {
            let today = store.clock().today();
            let (year, month) = match month {
                Some(m) => parse_month(&m)?,
                None => (today.year(), today.month()),
            };
            let projects = store.get_projects();
            for (date, due) in query::month_due_dates(&projects, year, month) {
                let label = date.to_string();
                let label = match query::urgency(date, today) {
                    Urgency::Overdue => label.red(),
                    Urgency::DueSoon => label.yellow(),
                    Urgency::Upcoming => label.green(),
                };
                let names: Vec<&str> = due.iter().map(|p| p.name.as_str()).collect();
                println!("{} {}", label, names.join(", "));
            }
        }
        Commands::Pomodoro {
            work,
            short_break,
            long_break,
            sessions,
        } => {
            let mut settings = store.get_pomodoro_settings();
            let changed = work.is_some() || short_break.is_some() || long_break.is_some() || sessions.is_some();
            settings.work_duration = work.unwrap_or(settings.work_duration);
            settings.break_duration = short_break.unwrap_or(settings.break_duration);
            settings.long_break_duration = long_break.unwrap_or(settings.long_break_duration);
            settings.sessions_until_long_break = sessions.unwrap_or(settings.sessions_until_long_break);
            if changed {
                store.save_pomodoro_settings(&settings)?;
            }
            let cycle = PomodoroCycle::new(settings);
            println!(
                "work {}  break {}  long break {}  long break every {} session(s)",
                format_clock(cycle.duration_secs(PomodoroMode::Work)),
                format_clock(cycle.duration_secs(PomodoroMode::Break)),
                format_clock(cycle.duration_secs(PomodoroMode::LongBreak)),
                settings.sessions_until_long_break
            );
        }
        Commands::Stats => {
            let projects = store.get_projects();
            let tasks = store.get_tasks();
            let entries = store.get_time_entries();
            let (active, archived) = query::split_archived(&projects);
            let daily = query::daily_tasks(&tasks, store.clock());
            let done = daily.iter().filter(|t| t.is_completed()).count();
            let minutes: u64 = entries.iter().map(|e| u64::from(e.duration)).sum();

            println!("Projects: {} active, {} archived", active.len(), archived.len());
            for column in query::board(&projects) {
                println!("  {:<12} {}", column.status.title(), column.projects.len());
            }
            println!("Clients:  {}", store.get_clients().len());
            println!("Daily:    {}/{} completed", done, daily.len());
            println!("Missed:   {}", query::missed_tasks(&tasks).len());
            println!("Tracked:  {:.1} h", minutes as f64 / 60.0);
            println!("Storage:  {}", query::format_file_size(store.backend().used_bytes()?));
        }
        Commands::Config { .. } => return Err(eyre!("config is handled before the store opens")),
    }

    Ok(())
}

fn configure(
    data_dir: &Path,
    backend: Option<BackendKind>,
    quota: Option<u64>,
    no_quota: bool,
    size_warning: Option<u64>,
) -> Result<()> {
    let mut config = Config::load(data_dir)?;
    let changed = backend.is_some() || quota.is_some() || no_quota || size_warning.is_some();

    if let Some(backend) = backend {
        config.backend = backend;
    }
    if no_quota {
        config.quota_bytes = None;
    } else if quota.is_some() {
        config.quota_bytes = quota;
    }
    if let Some(bytes) = size_warning {
        config.size_warning_bytes = bytes;
    }

    if changed {
        config.save()?;
        println!("Saved {}", data_dir.join(pskstore::config::CONFIG_FILE).display());
    }
    println!("backend:       {:?}", config.backend);
    println!(
        "quota:         {}",
        config.quota_bytes.map(query::format_file_size).unwrap_or_else(|| "none".to_string())
    );
    println!("size warning:  {}", query::format_file_size(config.size_warning_bytes));
    Ok(())
}

fn update_from_json<T: Entity>(store: &mut Store, id: &str, patch: &str) -> Result<bool> {
    let patch: T::Patch = serde_json::from_str(patch).context("Invalid patch")?;
    Ok(store.update::<T>(id, patch)?)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    date_field::parse(s).ok_or_else(|| eyre!("Invalid date: {} (expected YYYY-MM-DD)", s))
}

fn parse_month(s: &str) -> Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", s), date_field::FORMAT)
        .with_context(|| format!("Invalid month: {} (expected YYYY-MM)", s))?;
    Ok((date.year(), date.month()))
}

fn print_project(project: &Project, clients: &[Client], store: &Store) {
    let client = query::client_display_name(project, clients).unwrap_or("internal");
    let due = match project.due_date {
        Some(due) => {
            let text = format!("due {}", due);
            match query::urgency(due, store.clock().today()) {
                Urgency::Overdue => text.red().to_string(),
                Urgency::DueSoon => text.yellow().to_string(),
                Urgency::Upcoming => text,
            }
        }
        None => String::new(),
    };
    println!(
        "{} {} [{}] {} {}",
        project.id.dimmed(),
        project.name.bold(),
        project.status,
        client.cyan(),
        due
    );
}

fn print_task(task: &Task) {
    let mark = if task.is_completed() { "x".green() } else { " ".normal() };
    let missed = match task.missed_date {
        Some(day) => format!(" missed {}", day).red().to_string(),
        None => String::new(),
    };
    println!(
        "[{}] {} {} ({}){}",
        mark,
        task.id.dimmed(),
        task.title,
        task.priority,
        missed
    );
}
