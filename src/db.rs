//! The authoritative store and shared formatting helpers.
//!
//! All reads and writes of tasks, submissions, users and notifications go
//! through the [`Repository`] trait. [`Database`] is the in-memory
//! implementation; it can be loaded from and saved to a JSON file.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EntityKind, Error, Result};
use crate::fields::SubmissionStatus;
use crate::notify::{NewNotification, Notification};
use crate::submission::Submission;
use crate::task::Task;
use crate::user::User;

pub const TASK_ID_PREFIX: &str = "TSK";
pub const SUBMISSION_ID_PREFIX: &str = "SUB";

/// Read/write access to the task, submission, user and notification collections.
///
/// Identifiers are handed out by the store from monotonic sequences, never
/// derived from collection sizes.
pub trait Repository {
    fn tasks(&self) -> &[Task];
    fn task_mut(&mut self, id: &str) -> Result<&mut Task>;
    fn next_task_id(&mut self) -> String;
    fn insert_task(&mut self, task: Task);

    fn submissions(&self) -> &[Submission];
    fn submission_mut(&mut self, id: &str) -> Result<&mut Submission>;
    fn next_submission_id(&mut self) -> String;
    fn insert_submission(&mut self, submission: Submission);

    fn users(&self) -> &[User];

    fn notifications(&self) -> &[Notification];
    fn notification_mut(&mut self, id: u64) -> Result<&mut Notification>;
    fn push_notification(&mut self, notification: NewNotification, now_utc: i64) -> u64;

    fn task(&self, id: &str) -> Result<&Task> {
        self.tasks()
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::not_found(EntityKind::Task, id))
    }

    fn submission(&self, id: &str) -> Result<&Submission> {
        self.submissions()
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::not_found(EntityKind::Submission, id))
    }

    fn user(&self, id: &str) -> Result<&User> {
        self.users()
            .iter()
            .find(|u| u.id == id)
            .ok_or_else(|| Error::not_found(EntityKind::User, id))
    }

    /// The submission of `task_id` still waiting for review, if any.
    fn live_submission_for(&self, task_id: &str) -> Option<&Submission> {
        self.submissions()
            .iter()
            .find(|s| s.task_id == task_id && s.status == SubmissionStatus::PendingReview)
    }
}

/// In-memory store, serialisable as one JSON document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    task_seq: u64,
    #[serde(default)]
    submission_seq: u64,
    #[serde(default)]
    notification_seq: u64,
}

impl Database {
    /// Load the database from a JSON file. A missing file yields an empty database.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no database file, starting empty");
            return Ok(Database::default());
        }
        let buf = fs::read_to_string(path)?;
        let mut db: Database = serde_json::from_str(&buf).map_err(|e| {
            warn!(path = %path.display(), error = %e, "database file is not valid JSON");
            e
        })?;
        db.repair_sequences();
        Ok(db)
    }

    /// Save database to JSON file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        debug!(path = %path.display(), tasks = self.tasks.len(), submissions = self.submissions.len(), "database saved");
        Ok(())
    }

    /// Keep sequences ahead of every id already present, e.g. after a hand-edited file.
    fn repair_sequences(&mut self) {
        let task_floor = self.tasks.iter().filter_map(|t| id_number(&t.id)).max().unwrap_or(0);
        let sub_floor = self.submissions.iter().filter_map(|s| id_number(&s.id)).max().unwrap_or(0);
        let note_floor = self.notifications.iter().map(|n| n.id).max().unwrap_or(0);
        self.task_seq = self.task_seq.max(task_floor);
        self.submission_seq = self.submission_seq.max(sub_floor);
        self.notification_seq = self.notification_seq.max(note_floor);
    }
}

impl Repository for Database {
    fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::not_found(EntityKind::Task, id))
    }

    fn next_task_id(&mut self) -> String {
        self.task_seq += 1;
        display_id(TASK_ID_PREFIX, self.task_seq)
    }

    fn insert_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    fn submission_mut(&mut self, id: &str) -> Result<&mut Submission> {
        self.submissions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::not_found(EntityKind::Submission, id))
    }

    fn next_submission_id(&mut self) -> String {
        self.submission_seq += 1;
        display_id(SUBMISSION_ID_PREFIX, self.submission_seq)
    }

    fn insert_submission(&mut self, submission: Submission) {
        self.submissions.push(submission);
    }

    fn users(&self) -> &[User] {
        &self.users
    }

    fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    fn notification_mut(&mut self, id: u64) -> Result<&mut Notification> {
        self.notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::not_found(EntityKind::Notification, id.to_string()))
    }

    fn push_notification(&mut self, notification: NewNotification, now_utc: i64) -> u64 {
        self.notification_seq += 1;
        let id = self.notification_seq;
        self.notifications.push(Notification {
            id,
            title: notification.title,
            description: notification.description,
            created_at_utc: now_utc,
            is_read: false,
            link: notification.link,
        });
        id
    }
}

/// Format a sequence number as a display id, e.g. `TSK-007`.
pub fn display_id(prefix: &str, n: u64) -> String {
    format!("{prefix}-{n:03}")
}

/// Numeric part of a display id, if it has one.
fn id_number(id: &str) -> Option<u64> {
    id.rsplit('-').next()?.parse().ok()
}

/// Parse human-readable due date input.
///
/// Supports "today", "tomorrow", "end of week", "end of month", "in 3d",
/// "in 2w" and "YYYY-MM-DD".
pub fn parse_due_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "end of week" | "eow" => {
            let (_, end) = start_end_of_week(today);
            return Some(end);
        }
        "end of month" | "eom" => {
            let (year, month) = (today.year(), today.month());
            let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
            let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
            return Some(first_of_next - Duration::days(1));
        }
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        if let Some(nd) = rest.strip_suffix('d') {
            if let Ok(days) = nd.trim().parse::<i64>() {
                return Some(today + Duration::days(days));
            }
        }
        if let Some(nw) = rest.strip_suffix('w') {
            if let Ok(weeks) = nw.trim().parse::<i64>() {
                return Some(today + Duration::weeks(weeks));
            }
        }
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Start and end dates of the ISO week (Monday to Sunday) containing `today`.
pub fn start_end_of_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let weekday = today.weekday().num_days_from_monday() as i64;
    let start = today - Duration::days(weekday);
    (start, start + Duration::days(6))
}

/// Format a due timestamp relative to now ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: NaiveDateTime, now: NaiveDateTime) -> String {
    let days = (due.date() - now.date()).num_days();
    match days {
        0 if due < now => "late".into(),
        0 => "today".into(),
        1 => "tomorrow".into(),
        d if d > 1 => format!("in {d}d"),
        d => format!("{}d late", -d),
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}
