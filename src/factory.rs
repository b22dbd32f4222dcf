//! Task creation, publishing, requirement edits and the overdue sweep.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::info;

use crate::db::Repository;
use crate::error::{Error, FieldError, Result};
use crate::fields::{EntryType, TaskStatus};
use crate::notify::NewNotification;
use crate::task::*;

/// Due time used when the form leaves it blank.
pub const DEFAULT_DUE_TIME: &str = "23:59";
const MIN_NAME_LEN: usize = 2;

/// Raw task creation input, as collected from a form or the command line.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub name: String,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
    /// `HH:MM`, 24-hour.
    pub due_time: Option<String>,
    pub description: Option<String>,
    pub requirements: Vec<NewRequirement>,
    pub is_recurring: bool,
    pub repeat_end: Option<NaiveDate>,
    pub assigned_by: Option<String>,
}

/// One entry of an edited requirement list, in the new order.
#[derive(Debug, Clone)]
pub enum RequirementEdit {
    Keep(RequirementId),
    Add(NewRequirement),
}

/// Check a draft, collecting every problem rather than stopping at the first.
pub fn validate_draft<R: Repository + ?Sized>(repo: &R, draft: &TaskDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if draft.name.trim().chars().count() < MIN_NAME_LEN {
        errors.push(FieldError::new("name", "Task name must be at least 2 characters."));
    }
    if draft.assignee.as_deref().map_or(true, |a| a.trim().is_empty()) {
        errors.push(FieldError::new("assignee", "Please select a store or group to assign the task to."));
    }
    if draft.due_date.is_none() {
        errors.push(FieldError::new("due_date", "A due date is required."));
    }
    if parse_due_time(draft.due_time.as_deref().unwrap_or(DEFAULT_DUE_TIME)).is_none() {
        errors.push(FieldError::new("due_time", "Invalid time format. Use HH:MM."));
    }
    if draft.is_recurring {
        match (draft.repeat_end, draft.due_date) {
            (None, _) => errors.push(FieldError::new("repeat_end", "End date is required for recurring tasks.")),
            (Some(end), Some(due)) if end < due => {
                errors.push(FieldError::new("repeat_end", "End date cannot be before the due date."))
            }
            _ => {}
        }
    }
    if let Some(user_id) = &draft.assigned_by {
        if repo.user(user_id).is_err() {
            errors.push(FieldError::new("assigned_by", format!("Unknown user {user_id}.")));
        }
    }
    for (i, req) in draft.requirements.iter().enumerate() {
        validate_requirement(&format!("requirements[{i}]"), req, &mut errors);
    }
    errors
}

fn validate_requirement(field: &str, req: &NewRequirement, errors: &mut Vec<FieldError>) {
    if req.label.trim().is_empty() {
        errors.push(FieldError::new(format!("{field}.label"), "Label is required."));
    }
    match &req.body {
        RequirementBody::Image { min, max } => {
            if *max == 0 || min > max {
                errors.push(FieldError::new(field, format!("Image bounds {min}-{max} are invalid.")));
            }
        }
        RequirementBody::DataEntry { entry_type, options } => {
            if *entry_type != EntryType::Text && options.is_empty() {
                errors.push(FieldError::new(format!("{field}.options"), "Choice entries need at least one option."));
            }
            if options.iter().any(|o| o.text.trim().is_empty()) {
                errors.push(FieldError::new(format!("{field}.options"), "Option cannot be empty."));
            }
        }
        RequirementBody::Checklist { checklist_items } => {
            if checklist_items.is_empty() {
                errors.push(FieldError::new(format!("{field}.checklistItems"), "A checklist needs at least one item."));
            }
            if checklist_items.iter().any(|c| c.text.trim().is_empty()) {
                errors.push(FieldError::new(format!("{field}.checklistItems"), "Checklist item cannot be empty."));
            }
        }
        RequirementBody::PdfStandard { pdf_url } => {
            if pdf_url.trim().is_empty() {
                errors.push(FieldError::new(format!("{field}.pdfUrl"), "A standard document URL is required."));
            }
        }
    }
}

/// Parse a strict `HH:MM` 24-hour time.
pub fn parse_due_time(s: &str) -> Option<NaiveTime> {
    if s.len() != 5 {
        return None;
    }
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// Create a new Draft task from `draft`.
pub fn create_task<R: Repository + ?Sized>(repo: &mut R, draft: TaskDraft, now: NaiveDateTime) -> Result<Task> {
    let errors = validate_draft(repo, &draft);
    let due_time = parse_due_time(draft.due_time.as_deref().unwrap_or(DEFAULT_DUE_TIME));
    let (true, Some(due_date), Some(assignee), Some(due_time)) =
        (errors.is_empty(), draft.due_date, draft.assignee.as_deref(), due_time)
    else {
        return Err(Error::Validation(errors));
    };

    let id = repo.next_task_id();
    let mut task = Task::new(
        id,
        draft.name.trim().to_string(),
        Assignee::from(assignee.trim().to_string()),
        due_date.and_time(due_time),
        now.and_utc().timestamp(),
    );
    task.description = draft.description.filter(|d| !d.trim().is_empty());
    task.is_recurring = draft.is_recurring;
    task.repeat_end = draft.repeat_end.filter(|_| draft.is_recurring);
    task.assigned_by = draft.assigned_by;
    for req in draft.requirements {
        task.push_requirement(req);
    }

    info!(task = %task.id, name = %task.name, store = %task.store, task_type = %task.task_type(), "task created");
    repo.insert_task(task.clone());
    Ok(task)
}

/// Publish a Draft task, making it available to field users.
pub fn publish_task<R: Repository + ?Sized>(repo: &mut R, id: &str, now: NaiveDateTime) -> Result<()> {
    let now_utc = now.and_utc().timestamp();
    let task = repo.task_mut(id)?;
    if task.status != TaskStatus::Draft {
        return Err(Error::InvalidTransition { id: id.to_string(), from: task.status, action: "publish" });
    }
    task.status = TaskStatus::Active;
    task.updated_at_utc = now_utc;
    let note = NewNotification::task_assigned(&task.name, &task.id);
    info!(task = %id, "task published");
    repo.push_notification(note, now_utc);
    Ok(())
}

/// Replace a task's requirement list.
///
/// Kept requirements keep their ids, so results of earlier submissions still
/// resolve. Not allowed once a submission is waiting for review or the task is
/// finished.
pub fn replace_requirements<R: Repository + ?Sized>(
    repo: &mut R,
    id: &str,
    edits: Vec<RequirementEdit>,
    now: NaiveDateTime,
) -> Result<Task> {
    if let Some(live) = repo.live_submission_for(id) {
        return Err(Error::LiveSubmissionExists { task_id: id.to_string(), submission_id: live.id.clone() });
    }
    let task = repo.task(id)?;
    if !matches!(task.status, TaskStatus::Draft | TaskStatus::Active) {
        return Err(Error::InvalidTransition { id: id.to_string(), from: task.status, action: "edit requirements of" });
    }

    let mut errors = Vec::new();
    let mut kept = HashSet::new();
    for (i, edit) in edits.iter().enumerate() {
        match edit {
            RequirementEdit::Keep(rid) if task.requirement(*rid).is_none() => {
                errors.push(FieldError::new(format!("requirements[{i}]"), format!("Unknown requirement {rid}.")));
            }
            RequirementEdit::Keep(rid) if !kept.insert(*rid) => {
                errors.push(FieldError::new(format!("requirements[{i}]"), format!("Requirement {rid} is listed twice.")));
            }
            RequirementEdit::Keep(_) => {}
            RequirementEdit::Add(req) => validate_requirement(&format!("requirements[{i}]"), req, &mut errors),
        }
    }
    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }

    let task = repo.task_mut(id)?;
    let mut previous = std::mem::take(&mut task.requirements);
    for edit in edits {
        match edit {
            RequirementEdit::Keep(rid) => {
                if let Some(pos) = previous.iter().position(|r| r.id == rid) {
                    task.requirements.push(previous.remove(pos));
                }
            }
            RequirementEdit::Add(req) => {
                task.push_requirement(req);
            }
        }
    }
    task.updated_at_utc = now.and_utc().timestamp();
    info!(task = %id, requirements = task.requirements.len(), task_type = %task.task_type(), "requirements replaced");
    Ok(task.clone())
}

/// Move every Active task past its due time to Overdue. Returns the ids moved.
pub fn sweep_overdue<R: Repository + ?Sized>(repo: &mut R, now: NaiveDateTime) -> Vec<String> {
    let due: Vec<String> = repo.tasks().iter().filter(|t| t.is_overdue_at(now)).map(|t| t.id.clone()).collect();
    let now_utc = now.and_utc().timestamp();
    for id in &due {
        if let Ok(task) = repo.task_mut(id) {
            task.status = TaskStatus::Overdue;
            task.updated_at_utc = now_utc;
            let note = NewNotification::task_overdue(&task.name, &task.id);
            repo.push_notification(note, now_utc);
        }
    }
    if !due.is_empty() {
        info!(count = due.len(), "tasks marked overdue");
    }
    due
}

/// Compact requirement syntax used on the command line.
///
/// `image:<label>:<min>:<max>`, `text:<label>`, `single:<label>:<a|b|c>`,
/// `multiple:<label>:<a|b|c>`, `checklist:<label>:<item|item>`,
/// `pdf:<label>:<url>`.
impl FromStr for NewRequirement {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let kind = parts.next().unwrap_or_default().trim().to_lowercase();
        let label = parts.next().map(str::trim).unwrap_or_default().to_string();
        let rest = parts.next().unwrap_or_default();
        let list = |r: &str| -> Vec<String> {
            r.split('|').map(|x| x.trim().to_string()).filter(|x| !x.is_empty()).collect()
        };

        let body = match kind.as_str() {
            "image" => {
                let (min, max) = match rest.split_once(':') {
                    Some((a, b)) => (a.trim().parse(), b.trim().parse()),
                    None if rest.trim().is_empty() => (Ok(1), Ok(1)),
                    None => (rest.trim().parse(), rest.trim().parse()),
                };
                match (min, max) {
                    (Ok(min), Ok(max)) => RequirementBody::Image { min, max },
                    _ => return Err(format!("invalid image bounds in '{s}'")),
                }
            }
            "text" => RequirementBody::DataEntry { entry_type: EntryType::Text, options: Vec::new() },
            "single" | "multiple" => RequirementBody::DataEntry {
                entry_type: if kind == "single" { EntryType::Single } else { EntryType::Multiple },
                options: list(rest).into_iter().map(|text| ChoiceOption { text }).collect(),
            },
            "checklist" => RequirementBody::Checklist {
                checklist_items: list(rest).into_iter().map(|text| ChecklistItem { text }).collect(),
            },
            "pdf" | "pdf-standard" => RequirementBody::PdfStandard { pdf_url: rest.trim().to_string() },
            other => return Err(format!("unknown requirement kind '{other}'")),
        };
        Ok(NewRequirement { label, body })
    }
}
