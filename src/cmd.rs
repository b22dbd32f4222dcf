//! Command implementations for the CLI interface.
//!
//! Each handler works against a loaded [`Database`], saves it when it changed
//! something, and prints plain text to stdout. Errors are returned to `main`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::Subcommand;
use clap_complete::{generate, Shell};
use tracing::debug;

use crate::config::Config;
use crate::db::*;
use crate::error::{EntityKind, Error, FieldError, Result};
use crate::factory::{self, RequirementEdit, TaskDraft};
use crate::fields::*;
use crate::intake::{self, InputValue, SubmissionInput};
use crate::report::{self, CompletionBand, Thresholds};
use crate::review::{self, Decision, QueueFilter, QueueItem, ReviewQueue};
use crate::seed;
use crate::submission::{ChecklistOutcome, ResultValue, Submission};
use crate::task::{NewRequirement, RequirementBody, RequirementId, Task};
use crate::validation::{photo_data_uri, resolve_standard_url, validate_with_policy, VisualStandardRequest};

#[derive(Subcommand)]
pub enum Commands {
    /// Create, publish and inspect tasks.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Submit results for a task.
    Submit {
        /// Task ID, e.g. TSK-012.
        task_id: String,
        /// Name of the field user submitting.
        #[arg(long = "by")]
        submitted_by: String,
        /// Store the work was done at.
        #[arg(long)]
        store: String,
        /// Submission date: YYYY-MM-DD, "today", ... (default: today).
        #[arg(long)]
        date: Option<String>,
        /// JSON file mapping requirement ids to values.
        #[arg(long)]
        values: Option<PathBuf>,
        /// Text answer: ID=TEXT. May be repeated.
        #[arg(long = "text")]
        texts: Vec<String>,
        /// Single choice: ID=OPTION. May be repeated.
        #[arg(long = "choice")]
        choices: Vec<String>,
        /// Multiple choice: ID=A|B. May be repeated.
        #[arg(long = "choices")]
        multi_choices: Vec<String>,
        /// Photo: ID=FILE or ID=URL. Repeat to add several photos.
        #[arg(long = "image")]
        images: Vec<String>,
        /// Checklist outcomes in item order: ID=y,n:reason,y.
        #[arg(long = "check")]
        checks: Vec<String>,
    },

    /// Inspect submissions.
    Submission {
        #[command(subcommand)]
        action: SubmissionAction,
    },

    /// Review pending submissions.
    Review {
        #[command(subcommand)]
        action: ReviewAction,
    },

    /// Completion reports.
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Check a photo against a visual standard without submitting.
    Validate {
        /// Image file or data URI.
        #[arg(long)]
        photo: String,
        /// Standard document URL; relative URLs use `standards_base_url`.
        #[arg(long)]
        standard: String,
    },

    /// List users.
    Users,

    /// In-app notifications.
    Notifications {
        #[command(subcommand)]
        action: NotificationAction,
    },

    /// Replace the store's contents with demo data.
    Seed {
        /// Overwrite a non-empty store.
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a Draft task.
    Add {
        /// Task name.
        name: String,
        /// Store, store group, or "All Stores".
        #[arg(long)]
        store: Option<String>,
        /// Due date: YYYY-MM-DD, "today", "tomorrow", "in Nd", "eow", "eom".
        #[arg(long)]
        due: Option<String>,
        /// Due time HH:MM (default 23:59).
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        /// Requirement, e.g. "image:Shelf photo:1:2" or "checklist:Setup:Banner|Wobblers". May be repeated.
        #[arg(long = "req")]
        requirements: Vec<String>,
        #[arg(long)]
        recurring: bool,
        /// Last date of a recurring task.
        #[arg(long)]
        repeat_end: Option<String>,
        /// ID of the assigning user.
        #[arg(long)]
        assigned_by: Option<String>,
        /// Publish immediately.
        #[arg(long)]
        publish: bool,
    },

    /// Publish a Draft task.
    Publish { id: String },

    /// List tasks with optional filters.
    List {
        /// Include drafts.
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum)]
        status: Option<TaskStatus>,
        #[arg(long = "type", value_enum)]
        task_type: Option<TaskType>,
        /// Only tasks that apply to this store.
        #[arg(long)]
        store: Option<String>,
        #[arg(long, value_enum)]
        due: Option<DueFilter>,
        #[arg(long, value_enum, default_value_t = SortKey::Due)]
        sort: SortKey,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// View a task and its requirements.
    View { id: String },

    /// Replace the requirement list. Each entry is #ID to keep an existing
    /// requirement or a requirement spec to add one, in the new order.
    Requirements {
        id: String,
        #[arg(required = true)]
        entries: Vec<String>,
    },

    /// Mark Active tasks past their due time as Overdue.
    SweepOverdue,
}

#[derive(Subcommand)]
pub enum SubmissionAction {
    /// List submissions.
    List {
        #[arg(long, value_enum)]
        status: Option<SubmissionStatus>,
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        store: Option<String>,
    },
    /// View a submission's results.
    View { id: String },
}

#[derive(clap::Args, Clone, Default)]
pub struct QueueArgs {
    /// Match task name, store or task type.
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    store: Option<String>,
    #[arg(long = "type", value_enum)]
    task_type: Option<TaskType>,
}

impl From<QueueArgs> for QueueFilter {
    fn from(a: QueueArgs) -> Self {
        QueueFilter { search: a.search, store: a.store, task_type: a.task_type }
    }
}

#[derive(Subcommand)]
pub enum ReviewAction {
    /// Show the pending review queue.
    Queue {
        #[command(flatten)]
        filter: QueueArgs,
    },
    /// Approve a submission.
    Approve {
        id: String,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Reject a submission; feedback is required.
    Reject {
        id: String,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Work through the queue interactively.
    Run {
        #[command(flatten)]
        filter: QueueArgs,
    },
}

#[derive(Subcommand)]
pub enum ReportAction {
    /// Completion per store and department.
    Stores {
        /// Write CSV instead of a table.
        #[arg(long)]
        csv: bool,
        /// CSV output file (default: stdout).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Task counts by status.
    Summary {
        /// Only tasks that apply to this store.
        #[arg(long)]
        store: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum NotificationAction {
    /// List notifications, newest first.
    List {
        #[arg(long)]
        unread: bool,
    },
    /// Mark notifications as read.
    Read {
        id: Option<u64>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn fmt_utc(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0).single().map(|d| d.to_rfc3339()).unwrap_or_else(|| "-".into())
}

fn parse_date_arg(field: &str, s: &str, today: NaiveDate) -> Result<NaiveDate> {
    parse_due_input(s, today)
        .ok_or_else(|| Error::Validation(vec![FieldError::new(field, format!("Unrecognised date \"{s}\"."))]))
}

/// Create a new task.
#[allow(clippy::too_many_arguments)]
pub fn cmd_task_add(
    db: &mut Database,
    db_path: &Path,
    name: String,
    store: Option<String>,
    due: Option<String>,
    time: Option<String>,
    desc: Option<String>,
    requirements: Vec<String>,
    recurring: bool,
    repeat_end: Option<String>,
    assigned_by: Option<String>,
    publish: bool,
) -> Result<()> {
    let now = now();
    let today = now.date();
    let mut errors = Vec::new();
    let mut reqs = Vec::new();
    // Position on the command line of each parsed requirement.
    let mut parsed_at = Vec::new();
    for (i, arg) in requirements.iter().enumerate() {
        match arg.parse::<NewRequirement>() {
            Ok(r) => {
                reqs.push(r);
                parsed_at.push(i);
            }
            Err(e) => errors.push(FieldError::new(format!("requirements[{i}]"), e)),
        }
    }
    let mut date_arg = |field: &str, arg: Option<&str>| match arg.map(|d| (d, parse_due_input(d, today))) {
        Some((d, None)) => {
            errors.push(FieldError::new(field, format!("Unrecognised date \"{d}\".")));
            None
        }
        Some((_, date)) => date,
        None => None,
    };
    let due_date = date_arg("due_date", due.as_deref());
    let repeat_end = date_arg("repeat_end", repeat_end.as_deref());

    let draft = TaskDraft {
        name,
        assignee: store,
        due_date,
        due_time: time,
        description: desc,
        requirements: reqs,
        is_recurring: recurring,
        repeat_end,
        assigned_by,
    };
    if !errors.is_empty() {
        let reported: HashSet<String> = errors.iter().map(|e| e.field.clone()).collect();
        for mut e in factory::validate_draft(db, &draft) {
            e.field = renumber_requirement_field(&e.field, &parsed_at);
            if !reported.contains(&e.field) {
                errors.push(e);
            }
        }
        return Err(Error::Validation(errors));
    }
    let task = factory::create_task(db, draft, now)?;
    if publish {
        factory::publish_task(db, &task.id, now)?;
    }
    db.save(db_path)?;
    let status = db.task(&task.id)?.status;
    println!("Created {} \"{}\" [{}] ({})", task.id, task.name, task.task_type(), status);
    Ok(())
}

/// Map `requirements[j]...` from the parsed list back to the argument position.
fn renumber_requirement_field(field: &str, parsed_at: &[usize]) -> String {
    let renumbered = field
        .strip_prefix("requirements[")
        .and_then(|rest| rest.split_once(']'))
        .and_then(|(j, tail)| Some((*parsed_at.get(j.parse::<usize>().ok()?)?, tail)));
    match renumbered {
        Some((i, tail)) => format!("requirements[{i}]{tail}"),
        None => field.to_string(),
    }
}

pub fn cmd_task_publish(db: &mut Database, db_path: &Path, id: String) -> Result<()> {
    factory::publish_task(db, &id, now())?;
    db.save(db_path)?;
    println!("Published {id}.");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_task_list(
    db: &Database,
    all: bool,
    status: Option<TaskStatus>,
    task_type: Option<TaskType>,
    store: Option<String>,
    due: Option<DueFilter>,
    sort: SortKey,
    limit: Option<usize>,
) {
    let now = now();
    let today = now.date();
    let (week_start, week_end) = start_end_of_week(today);

    let mut filtered: Vec<&Task> = db
        .tasks
        .iter()
        .filter(|t| {
            if !all && status.is_none() && t.status == TaskStatus::Draft {
                return false;
            }
            if status.is_some_and(|s| t.status != s) {
                return false;
            }
            if task_type.is_some_and(|k| t.task_type() != k) {
                return false;
            }
            if let Some(ref s) = store {
                if !t.store.applies_to(s) {
                    return false;
                }
            }
            match due {
                Some(DueFilter::Today) => t.due.date() == today,
                Some(DueFilter::ThisWeek) => t.due.date() >= week_start && t.due.date() <= week_end,
                Some(DueFilter::Overdue) => t.status == TaskStatus::Overdue || t.is_overdue_at(now),
                None => true,
            }
        })
        .collect();

    match sort {
        SortKey::Due => filtered.sort_by(|a, b| a.due.cmp(&b.due).then(a.id.cmp(&b.id))),
        SortKey::Id => filtered.sort_by(|a, b| a.id.cmp(&b.id)),
        SortKey::Status => filtered.sort_by(|a, b| a.status.to_string().cmp(&b.status.to_string()).then(a.id.cmp(&b.id))),
    }
    if let Some(n) = limit {
        filtered.truncate(n);
    }
    print_task_table(&filtered, now);
}

fn print_task_table(tasks: &[&Task], now: NaiveDateTime) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    println!("{:<8} {:<30} {:<18} {:<17} {:<15} {}", "ID", "NAME", "STORE", "DUE", "TYPE", "STATUS");
    for t in tasks {
        let due = format!("{} ({})", t.due.format("%Y-%m-%d"), format_due_relative(t.due, now));
        println!(
            "{:<8} {:<30} {:<18} {:<17} {:<15} {}",
            t.id,
            truncate(&t.name, 30),
            truncate(t.store.name(), 18),
            truncate(&due, 17),
            t.task_type().to_string(),
            t.status,
        );
    }
}

pub fn cmd_task_view(db: &Database, id: String) -> Result<()> {
    let task = db.task(&id)?;
    let now = now();
    println!("ID:           {}", task.id);
    println!("Name:         {}", task.name);
    println!("Store:        {}", task.store);
    println!("Type:         {}", task.task_type());
    println!("Status:       {}", task.status);
    println!("Due:          {} ({})", task.due.format("%Y-%m-%d %H:%M"), format_due_relative(task.due, now));
    if task.is_recurring {
        println!("Recurring:    until {}", task.repeat_end.map(|d| d.to_string()).unwrap_or_else(|| "-".into()));
    }
    let assigner = task.assigned_by.as_deref().map(|u| match db.user(u) {
        Ok(user) => format!("{} ({}, {})", user.name, user.id, user.department),
        Err(_) => u.to_string(),
    });
    println!("Assigned by:  {}", assigner.unwrap_or_else(|| "-".into()));
    println!("Created UTC:  {}", fmt_utc(task.created_at_utc));
    println!("Updated UTC:  {}", fmt_utc(task.updated_at_utc));
    println!("Description:\n{}\n", task.description.as_deref().unwrap_or("-"));

    println!("Requirements:");
    if task.requirements.is_empty() {
        println!("  -");
    }
    for req in &task.requirements {
        let detail = match &req.body {
            RequirementBody::Image { min, max } => format!("{min}-{max} photo(s)"),
            RequirementBody::DataEntry { entry_type, options } if options.is_empty() => format!("{entry_type:?}").to_lowercase(),
            RequirementBody::DataEntry { entry_type, options } => format!(
                "{}: {}",
                format!("{entry_type:?}").to_lowercase(),
                options.iter().map(|o| o.text.as_str()).collect::<Vec<_>>().join(" | ")
            ),
            RequirementBody::Checklist { checklist_items } => format!("{} item(s)", checklist_items.len()),
            RequirementBody::PdfStandard { pdf_url } => pdf_url.clone(),
        };
        println!("  #{:<3} {:<13} {}  [{}]", req.id, req.kind().to_string(), req.label, detail);
        if let RequirementBody::Checklist { checklist_items } = &req.body {
            for item in checklist_items {
                println!("         - {}", item.text);
            }
        }
    }

    let history: Vec<&Submission> = db.submissions.iter().filter(|s| s.task_id == task.id).collect();
    if !history.is_empty() {
        println!("\nSubmissions:");
        for s in history {
            println!("  {} {} {} by {} [{}]", s.id, s.date, s.store, s.submitted_by, s.status);
        }
    }
    Ok(())
}

fn parse_requirement_edit(s: &str) -> std::result::Result<RequirementEdit, String> {
    match s.strip_prefix('#') {
        Some(id) => id
            .trim()
            .parse()
            .map(|n| RequirementEdit::Keep(RequirementId(n)))
            .map_err(|_| format!("invalid requirement id '{s}'")),
        None => s.parse().map(RequirementEdit::Add),
    }
}

pub fn cmd_task_requirements(db: &mut Database, db_path: &Path, id: String, entries: Vec<String>) -> Result<()> {
    let mut edits = Vec::new();
    let mut errors = Vec::new();
    for (i, e) in entries.iter().enumerate() {
        match parse_requirement_edit(e) {
            Ok(edit) => edits.push(edit),
            Err(msg) => errors.push(FieldError::new(format!("requirements[{i}]"), msg)),
        }
    }
    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }
    let task = factory::replace_requirements(db, &id, edits, now())?;
    db.save(db_path)?;
    let ids: Vec<String> = task.requirements.iter().map(|r| format!("#{}", r.id)).collect();
    println!("{}: requirements {} [{}]", task.id, ids.join(" "), task.task_type());
    Ok(())
}

pub fn cmd_task_sweep_overdue(db: &mut Database, db_path: &Path) -> Result<()> {
    let moved = factory::sweep_overdue(db, now());
    if moved.is_empty() {
        println!("No tasks overdue.");
        return Ok(());
    }
    db.save(db_path)?;
    println!("Marked overdue: {}", moved.join(", "));
    Ok(())
}

fn split_entry(flag: &str, s: &str) -> Result<(RequirementId, String)> {
    let bad = || Error::Validation(vec![FieldError::new(flag, format!("Expected ID=VALUE, got \"{s}\"."))]);
    let (id, value) = s.split_once('=').ok_or_else(bad)?;
    let id = id.trim().trim_start_matches('#').parse().map_err(|_| bad())?;
    Ok((RequirementId(id), value.to_string()))
}

fn image_ref(value: &str) -> Result<String> {
    let path = Path::new(value);
    if value.starts_with("data:") || value.contains("://") || !path.is_file() {
        return Ok(value.to_string());
    }
    let mime = match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    let bytes = fs::read(path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "photo read");
    Ok(photo_data_uri(mime, &bytes))
}

fn checklist_outcomes(task: &Task, id: RequirementId, marks: &str) -> Result<Vec<ChecklistOutcome>> {
    let field = format!("values[{id}]");
    let Some(RequirementBody::Checklist { checklist_items }) = task.requirement(id).map(|r| &r.body) else {
        return Err(Error::Validation(vec![FieldError::new(field, "Not a checklist requirement.")]));
    };
    let tokens: Vec<&str> = marks.split(',').collect();
    if tokens.len() != checklist_items.len() {
        return Err(Error::Validation(vec![FieldError::new(
            field,
            format!("Expected {} outcome(s), got {}.", checklist_items.len(), tokens.len()),
        )]));
    }
    tokens
        .into_iter()
        .zip(checklist_items)
        .map(|(token, item)| {
            let (mark, reason) = match token.split_once(':') {
                Some((m, r)) => (m.trim(), Some(r.trim().to_string()).filter(|r| !r.is_empty())),
                None => (token.trim(), None),
            };
            let pass = match mark.to_lowercase().as_str() {
                "y" | "yes" | "pass" | "1" => true,
                "n" | "no" | "fail" | "0" => false,
                _ => return Err(Error::Validation(vec![FieldError::new(field.clone(), format!("Expected y or n, got \"{mark}\"."))])),
            };
            Ok(ChecklistOutcome { text: item.text.clone(), pass, reason })
        })
        .collect()
}

/// Gather submission values from a JSON file and the per-kind flags.
#[allow(clippy::too_many_arguments)]
fn collect_values(
    task: &Task,
    values: Option<PathBuf>,
    texts: Vec<String>,
    choices: Vec<String>,
    multi_choices: Vec<String>,
    images: Vec<String>,
    checks: Vec<String>,
) -> Result<BTreeMap<RequirementId, InputValue>> {
    let mut map: BTreeMap<RequirementId, InputValue> = match values {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => BTreeMap::new(),
    };
    for s in texts {
        let (id, v) = split_entry("text", &s)?;
        map.insert(id, InputValue::Text(v));
    }
    for s in choices {
        let (id, v) = split_entry("choice", &s)?;
        map.insert(id, InputValue::Choice(v));
    }
    for s in multi_choices {
        let (id, v) = split_entry("choices", &s)?;
        let list = v.split('|').map(|x| x.trim().to_string()).filter(|x| !x.is_empty()).collect();
        map.insert(id, InputValue::Choices(list));
    }
    for s in images {
        let (id, v) = split_entry("image", &s)?;
        let photo = image_ref(&v)?;
        match map.entry(id).or_insert_with(|| InputValue::Images(Vec::new())) {
            InputValue::Images(list) => list.push(photo),
            other => *other = InputValue::Images(vec![photo]),
        }
    }
    for s in checks {
        let (id, v) = split_entry("check", &s)?;
        map.insert(id, InputValue::Checklist(checklist_outcomes(task, id, &v)?));
    }
    Ok(map)
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_submit(
    db: &mut Database,
    db_path: &Path,
    config: &Config,
    task_id: String,
    submitted_by: String,
    store: String,
    date: Option<String>,
    values: Option<PathBuf>,
    texts: Vec<String>,
    choices: Vec<String>,
    multi_choices: Vec<String>,
    images: Vec<String>,
    checks: Vec<String>,
) -> Result<()> {
    let now = now();
    let task = db.task(&task_id)?.clone();
    let date = match date {
        Some(d) => parse_date_arg("date", &d, now.date())?,
        None => now.date(),
    };
    let input = SubmissionInput {
        task_id,
        submitted_by,
        store,
        date,
        values: collect_values(&task, values, texts, choices, multi_choices, images, checks)?,
    };
    let validator = config.validator()?;
    let submission = intake::submit(db, validator.as_ref(), &config.intake_options(), &input, now).await?;
    db.save(db_path)?;
    println!("Submitted {} for {} \"{}\" ({})", submission.id, submission.task_id, submission.task_name, submission.status);
    Ok(())
}

pub fn cmd_submission_list(
    db: &Database,
    status: Option<SubmissionStatus>,
    task: Option<String>,
    store: Option<String>,
) {
    let rows: Vec<&Submission> = db
        .submissions
        .iter()
        .filter(|s| status.map_or(true, |st| s.status == st))
        .filter(|s| task.as_deref().map_or(true, |t| s.task_id == t))
        .filter(|s| store.as_deref().map_or(true, |st| s.store.eq_ignore_ascii_case(st)))
        .collect();
    if rows.is_empty() {
        println!("No submissions.");
        return;
    }
    println!("{:<8} {:<8} {:<28} {:<16} {:<12} {:<10} {}", "ID", "TASK", "TASK NAME", "STORE", "BY", "DATE", "STATUS");
    for s in rows {
        println!(
            "{:<8} {:<8} {:<28} {:<16} {:<12} {:<10} {}",
            s.id,
            s.task_id,
            truncate(&s.task_name, 28),
            truncate(&s.store, 16),
            truncate(&s.submitted_by, 12),
            s.date,
            s.status
        );
    }
}

pub fn cmd_submission_view(db: &Database, id: String) -> Result<()> {
    let sub = db.submission(&id)?;
    let task = db.task(&sub.task_id).ok();
    println!("ID:           {}", sub.id);
    println!("Task:         {} \"{}\"", sub.task_id, sub.task_name);
    println!("Store:        {}", sub.store);
    println!("Submitted by: {}", sub.submitted_by);
    println!("Date:         {}", sub.date);
    println!("Status:       {}", sub.status);
    if let Some(at) = sub.reviewed_at_utc {
        println!("Reviewed UTC: {}", fmt_utc(at));
    }
    if let Some(fb) = &sub.feedback {
        println!("Feedback:     {fb}");
    }
    println!("\nResults:");
    if sub.results.is_empty() {
        println!("  -");
    }
    for r in &sub.results {
        let label = task
            .and_then(|t| t.requirement(r.requirement_id))
            .map(|req| req.label.as_str())
            .unwrap_or("(requirement removed)");
        println!("  #{} {} [{}]", r.requirement_id, label, r.kind);
        match &r.value {
            ResultValue::Text(t) => println!("      {t}"),
            ResultValue::List(items) => {
                for item in items {
                    println!("      - {}", truncate(item, 72));
                }
            }
            ResultValue::Checklist(items) => {
                for c in items {
                    let mark = if c.pass { "PASS" } else { "FAIL" };
                    match &c.reason {
                        Some(reason) => println!("      [{mark}] {} ({reason})", c.text),
                        None => println!("      [{mark}] {}", c.text),
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_queue(items: &[QueueItem], cursor: Option<usize>, out: &mut impl Write) -> Result<()> {
    if items.is_empty() {
        writeln!(out, "Review queue is empty.")?;
        return Ok(());
    }
    for (i, item) in items.iter().enumerate() {
        let marker = if Some(i) == cursor { ">" } else { " " };
        let kind = item.task_type.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
        writeln!(
            out,
            "{marker} {:<8} {:<28} {:<16} {:<15} {:<12} {}",
            item.submission_id,
            truncate(&item.task_name, 28),
            truncate(&item.store, 16),
            kind,
            truncate(&item.submitted_by, 12),
            item.date
        )?;
    }
    Ok(())
}

pub fn cmd_review_queue(db: &Database, filter: QueueArgs) -> Result<()> {
    let queue = ReviewQueue::new(db, filter.into());
    print_queue(queue.visible(), None, &mut std::io::stdout())
}

pub fn cmd_review_approve(db: &mut Database, db_path: &Path, id: String, feedback: Option<String>) -> Result<()> {
    let sub = review::approve(db, &id, feedback.as_deref(), now())?;
    db.save(db_path)?;
    println!("Approved {} ({} now {})", sub.id, sub.task_id, db.task(&sub.task_id)?.status);
    Ok(())
}

pub fn cmd_review_reject(db: &mut Database, db_path: &Path, id: String, feedback: Option<String>) -> Result<()> {
    let sub = review::reject(db, &id, feedback.as_deref().unwrap_or_default(), now())?;
    db.save(db_path)?;
    println!("Rejected {} ({} now {})", sub.id, sub.task_id, db.task(&sub.task_id)?.status);
    Ok(())
}

const REVIEW_HELP: &str = "commands: approve [feedback] | reject <feedback> | next | prev | list | quit";

/// Interactive review session reading commands from `input`.
pub fn cmd_review_run(
    db: &mut Database,
    db_path: &Path,
    filter: QueueArgs,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    let mut queue = ReviewQueue::new(db, filter.into());
    print_queue(queue.visible(), queue.cursor(), out)?;
    writeln!(out, "{REVIEW_HELP}")?;

    let mut lines = input.lines();
    while let Some(selected) = queue.selected().cloned() {
        write!(out, "[{}] > ", selected.submission_id)?;
        out.flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let decision = match command {
            "a" | "approve" => Decision::Approve(Some(rest.to_string())),
            "r" | "reject" => Decision::Reject(rest.to_string()),
            "n" | "next" => {
                queue.select_next();
                continue;
            }
            "p" | "prev" => {
                queue.select_prev();
                continue;
            }
            "l" | "list" => {
                print_queue(queue.visible(), queue.cursor(), out)?;
                continue;
            }
            "q" | "quit" => break,
            "" => continue,
            _ => {
                writeln!(out, "{REVIEW_HELP}")?;
                continue;
            }
        };
        match queue.decide(db, decision, now()) {
            Ok(sub) => {
                db.save(db_path)?;
                writeln!(out, "{} {}", sub.status, sub.id)?;
            }
            Err(e @ (Error::FeedbackRequired | Error::StaleSubmission { .. })) => writeln!(out, "error: {e}")?,
            Err(e) => return Err(e),
        }
    }
    if queue.visible().is_empty() {
        writeln!(out, "Review queue is empty.")?;
    }
    Ok(())
}

fn fmt_pct(pct: Option<u32>, thresholds: &Thresholds) -> String {
    match pct {
        None => "-".into(),
        Some(p) => match thresholds.band(p) {
            CompletionBand::Normal => format!("{p}%"),
            band => format!("{p}% {}", if band == CompletionBand::Critical { "!!" } else { "!" }),
        },
    }
}

pub fn cmd_report_stores(db: &Database, config: &Config, csv: bool, output: Option<PathBuf>) -> Result<()> {
    let reports = report::store_reports(&db.tasks, &db.users);
    if csv || output.is_some() {
        let data = report::to_csv(&reports);
        match output {
            Some(path) => {
                fs::write(&path, data)?;
                println!("Exported {} store(s) to {}", reports.len(), path.display());
            }
            None => print!("{data}"),
        }
        return Ok(());
    }
    if reports.is_empty() {
        println!("No stores.");
        return Ok(());
    }
    let thresholds = config.thresholds();
    let mut header = format!("{:<7} {:<18} {:<16}", "CODE", "STORE", "OVERVIEW");
    for d in Department::ALL {
        header.push_str(&format!(" {:<14}", d.to_string()));
    }
    println!("{}", header.trim_end());
    for r in &reports {
        let cell = |s: &report::DepartmentStats| format!("{}/{} {}", s.completed, s.total, fmt_pct(s.percentage(), &thresholds));
        let mut line = format!("{:<7} {:<18} {:<16}", r.store_code, truncate(&r.store_name, 18), cell(&r.overview));
        for d in Department::ALL {
            let stats = r.departments.get(&d).copied().unwrap_or_default();
            line.push_str(&format!(" {:<14}", cell(&stats)));
        }
        println!("{}", line.trim_end());
        if r.unattributed.total > 0 {
            println!("        ({} task(s) without a known assigner)", r.unattributed.total);
        }
    }
    Ok(())
}

pub fn cmd_report_summary(db: &Database, store: Option<String>) {
    let tasks: Vec<Task> = match &store {
        Some(s) => db.tasks.iter().filter(|t| t.store.applies_to(s)).cloned().collect(),
        None => db.tasks.clone(),
    };
    let s = report::status_summary(&tasks);
    println!("Total:          {}", s.total);
    println!("Active:         {}", s.active);
    println!("Pending Review: {}", s.pending_review);
    println!("Completed:      {}", s.completed);
    println!("Rejected:       {}", s.rejected);
    println!("Overdue:        {}", s.overdue);
}

pub async fn cmd_validate(config: &Config, photo: String, standard: String) -> Result<()> {
    let photo_data_uri = image_ref(&photo)?;
    let standard_pdf_url = resolve_standard_url(&standard, config.standards_base_url.as_deref()).ok_or_else(|| {
        Error::Validation(vec![FieldError::new("standard", format!("\"{standard}\" is not an absolute URL."))])
    })?;
    let request = VisualStandardRequest { photo_data_uri, standard_pdf_url };
    let validator = config.validator()?;
    let response = validate_with_policy(validator.as_ref(), &request, &config.validation_policy())
        .await
        .map_err(|e| Error::ValidationUnavailable(e.to_string()))?;
    if response.is_ok() {
        println!("OK");
        return Ok(());
    }
    println!("NOT_OK: {}", response.failure_reason.as_deref().unwrap_or("-"));
    for zone in response.failed_zones.unwrap_or_default() {
        println!("  {}: {}", zone.zone_id, zone.reason);
    }
    Ok(())
}

pub fn cmd_users(db: &Database) {
    if db.users.is_empty() {
        println!("No users.");
        return;
    }
    println!("{:<8} {:<18} {:<28} {:<8} {}", "ID", "NAME", "EMAIL", "ROLE", "DEPARTMENT");
    for u in &db.users {
        println!("{:<8} {:<18} {:<28} {:<8} {}", u.id, u.name, truncate(&u.email, 28), u.role.to_string(), u.department);
    }
}

pub fn cmd_notifications_list(db: &Database, unread: bool) {
    let mut notes: Vec<_> = db.notifications.iter().filter(|n| !unread || !n.is_read).collect();
    notes.sort_by(|a, b| b.created_at_utc.cmp(&a.created_at_utc).then(b.id.cmp(&a.id)));
    if notes.is_empty() {
        println!("No notifications.");
        return;
    }
    for n in notes {
        let marker = if n.is_read { " " } else { "*" };
        println!("{marker} {:>3} {:<22} {}", n.id, n.title, fmt_utc(n.created_at_utc));
        println!("      {}", n.description);
        if let Some(link) = &n.link {
            println!("      {link}");
        }
    }
}

pub fn cmd_notifications_read(db: &mut Database, db_path: &Path, id: Option<u64>, all: bool) -> Result<()> {
    let count = match (id, all) {
        (Some(id), _) => {
            db.notification_mut(id)?.is_read = true;
            1
        }
        (None, true) => {
            let mut count = 0;
            for n in db.notifications.iter_mut().filter(|n| !n.is_read) {
                n.is_read = true;
                count += 1;
            }
            count
        }
        (None, false) => {
            return Err(Error::Validation(vec![FieldError::new("id", "Give a notification id or --all.")]));
        }
    };
    db.save(db_path)?;
    println!("Marked {count} notification(s) read.");
    Ok(())
}

pub fn cmd_seed(db: &mut Database, db_path: &Path, force: bool) -> Result<()> {
    let empty = db.tasks.is_empty() && db.submissions.is_empty() && db.users.is_empty();
    if !empty && !force {
        return Err(Error::Config(format!(
            "{} already has data; pass --force to replace it",
            db_path.display()
        )));
    }
    let summary = seed::seed(db, now())?;
    db.save(db_path)?;
    println!(
        "Seeded {} users, {} tasks, {} submissions, {} notifications into {}",
        summary.users,
        summary.tasks,
        summary.submissions,
        summary.notifications,
        db_path.display()
    );
    Ok(())
}

pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

/// The command that lists entities of `kind`.
pub fn entity_hint(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Task => "cf task list",
        EntityKind::Submission => "cf submission list",
        EntityKind::User => "cf users",
        EntityKind::Notification => "cf notifications list",
    }
}
