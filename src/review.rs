//! Review decisions and the reviewer's queue.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::db::Repository;
use crate::error::{Error, Result};
use crate::fields::{SubmissionStatus, TaskStatus, TaskType};
use crate::notify::NewNotification;
use crate::submission::Submission;

/// Approve a pending submission and complete its task.
pub fn approve<R: Repository + ?Sized>(
    repo: &mut R,
    submission_id: &str,
    feedback: Option<&str>,
    now: NaiveDateTime,
) -> Result<Submission> {
    let feedback = feedback.map(str::trim).filter(|f| !f.is_empty()).map(str::to_string);
    decide(repo, submission_id, SubmissionStatus::Approved, feedback, now)
}

/// Reject a pending submission, sending the task back to the field.
///
/// Feedback is mandatory; without it nothing changes.
pub fn reject<R: Repository + ?Sized>(
    repo: &mut R,
    submission_id: &str,
    feedback: &str,
    now: NaiveDateTime,
) -> Result<Submission> {
    let feedback = feedback.trim();
    if feedback.is_empty() {
        warn!(submission = submission_id, "rejection refused without feedback");
        return Err(Error::FeedbackRequired);
    }
    decide(repo, submission_id, SubmissionStatus::Rejected, Some(feedback.to_string()), now)
}

fn decide<R: Repository + ?Sized>(
    repo: &mut R,
    submission_id: &str,
    outcome: SubmissionStatus,
    feedback: Option<String>,
    now: NaiveDateTime,
) -> Result<Submission> {
    let current = repo.submission(submission_id)?;
    if current.status != SubmissionStatus::PendingReview {
        return Err(Error::StaleSubmission { id: submission_id.to_string(), status: current.status });
    }
    let task_id = current.task_id.clone();
    repo.task(&task_id)?;

    let now_utc = now.and_utc().timestamp();
    let submission = repo.submission_mut(submission_id)?;
    submission.status = outcome;
    submission.feedback = feedback;
    submission.reviewed_at_utc = Some(now_utc);
    let decided = submission.clone();

    let task = repo.task_mut(&task_id)?;
    let notification = match outcome {
        SubmissionStatus::Rejected => {
            task.status = TaskStatus::Rejected;
            NewNotification::submission_rejected(&decided.task_name, &decided.store, &decided.id)
        }
        _ => {
            task.status = TaskStatus::Completed;
            NewNotification::submission_approved(&decided.task_name, &decided.store, &decided.id)
        }
    };
    task.updated_at_utc = now_utc;
    repo.push_notification(notification, now_utc);

    info!(submission = %decided.id, task = %task_id, status = %outcome, "submission reviewed");
    Ok(decided)
}

/// A reviewer's decision on the selected submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve(Option<String>),
    Reject(String),
}

/// Facets narrowing the visible queue. Empty facets match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueFilter {
    /// Case-insensitive substring of task name, store or task type.
    pub search: Option<String>,
    pub store: Option<String>,
    pub task_type: Option<TaskType>,
}

impl QueueFilter {
    fn matches(&self, item: &QueueItem) -> bool {
        let search = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        if let Some(needle) = search.map(str::to_lowercase) {
            let type_name = item.task_type.map(|t| t.to_string()).unwrap_or_default();
            let hit = [item.task_name.as_str(), item.store.as_str(), type_name.as_str()]
                .iter()
                .any(|h| h.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(store) = self.store.as_deref() {
            if !item.store.eq_ignore_ascii_case(store.trim()) {
                return false;
            }
        }
        match self.task_type {
            Some(t) => item.task_type == Some(t),
            None => true,
        }
    }
}

/// One row of the review queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub submission_id: String,
    pub task_id: String,
    pub task_name: String,
    pub store: String,
    pub submitted_by: String,
    pub date: NaiveDate,
    /// Type of the originating task; `None` if the task is gone.
    pub task_type: Option<TaskType>,
}

/// Pending Review submissions, filtered, with a selection cursor.
///
/// The queue is a view: filtering and moving the cursor never touch
/// submission state. Only [`ReviewQueue::decide`] does.
#[derive(Debug, Clone, Default)]
pub struct ReviewQueue {
    filter: QueueFilter,
    visible: Vec<QueueItem>,
    cursor: Option<usize>,
}

impl ReviewQueue {
    pub fn new<R: Repository + ?Sized>(repo: &R, filter: QueueFilter) -> Self {
        let mut queue = Self { filter, ..Self::default() };
        queue.refresh(repo);
        queue
    }

    /// Every pending submission in queue order, ignoring facets.
    pub fn pending<R: Repository + ?Sized>(repo: &R) -> Vec<QueueItem> {
        repo.submissions()
            .iter()
            .filter(|s| s.status == SubmissionStatus::PendingReview)
            .map(|s| QueueItem {
                submission_id: s.id.clone(),
                task_id: s.task_id.clone(),
                task_name: s.task_name.clone(),
                store: s.store.clone(),
                submitted_by: s.submitted_by.clone(),
                date: s.date,
                task_type: repo.task(&s.task_id).ok().map(|t| t.task_type()),
            })
            .collect()
    }

    /// Rebuild the visible list, keeping the selection if it is still visible.
    pub fn refresh<R: Repository + ?Sized>(&mut self, repo: &R) {
        let selected = self.selected().map(|i| i.submission_id.clone());
        self.visible = Self::pending(repo).into_iter().filter(|i| self.filter.matches(i)).collect();
        self.cursor = selected
            .and_then(|id| self.visible.iter().position(|i| i.submission_id == id))
            .or(if self.visible.is_empty() { None } else { Some(0) });
        debug!(visible = self.visible.len(), cursor = ?self.cursor, "review queue refreshed");
    }

    pub fn set_filter<R: Repository + ?Sized>(&mut self, repo: &R, filter: QueueFilter) {
        self.filter = filter;
        self.refresh(repo);
    }

    pub fn filter(&self) -> &QueueFilter {
        &self.filter
    }

    pub fn visible(&self) -> &[QueueItem] {
        &self.visible
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn selected(&self) -> Option<&QueueItem> {
        self.cursor.and_then(|c| self.visible.get(c))
    }

    pub fn select_next(&mut self) {
        if let Some(c) = self.cursor {
            self.cursor = Some((c + 1).min(self.visible.len().saturating_sub(1)));
        }
    }

    pub fn select_prev(&mut self) {
        if let Some(c) = self.cursor {
            self.cursor = Some(c.saturating_sub(1));
        }
    }

    /// Apply `decision` to the selected submission and advance.
    ///
    /// The cursor stays at the same visible position, which now holds the
    /// next item, clamped to the end of the list.
    pub fn decide<R: Repository + ?Sized>(
        &mut self,
        repo: &mut R,
        decision: Decision,
        now: NaiveDateTime,
    ) -> Result<Submission> {
        let (position, id) = match (self.cursor, self.selected()) {
            (Some(c), Some(item)) => (c, item.submission_id.clone()),
            _ => return Err(Error::NothingSelected),
        };
        let decided = match decision {
            Decision::Approve(feedback) => approve(repo, &id, feedback.as_deref(), now)?,
            Decision::Reject(feedback) => reject(repo, &id, &feedback, now)?,
        };

        self.visible = Self::pending(repo).into_iter().filter(|i| self.filter.matches(i)).collect();
        self.cursor = match self.visible.len() {
            0 => None,
            n => Some(position.min(n - 1)),
        };
        debug!(cursor = ?self.cursor, remaining = self.visible.len(), "review queue advanced");
        Ok(decided)
    }
}
