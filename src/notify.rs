//! In-app notifications raised by review decisions and overdue sweeps.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub created_at_utc: i64,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// A notification before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub title: String,
    pub description: String,
    pub link: Option<String>,
}

impl NewNotification {
    pub fn submission_approved(task_name: &str, store: &str, submission_id: &str) -> Self {
        Self {
            title: "Submission Approved".into(),
            description: format!("Your submission for \"{task_name}\" at {store} was approved."),
            link: Some(format!("/submissions/{submission_id}")),
        }
    }

    pub fn submission_rejected(task_name: &str, store: &str, submission_id: &str) -> Self {
        Self {
            title: "Submission Rejected".into(),
            description: format!("Your submission for \"{task_name}\" at {store} needs rework."),
            link: Some(format!("/submissions/{submission_id}")),
        }
    }

    pub fn task_overdue(task_name: &str, task_id: &str) -> Self {
        Self {
            title: "Task Overdue".into(),
            description: format!("The task \"{task_name}\" is now overdue."),
            link: Some(format!("/tasks/{task_id}")),
        }
    }

    pub fn task_assigned(task_name: &str, task_id: &str) -> Self {
        Self {
            title: "New Task Assigned".into(),
            description: format!("You have been assigned a new task: \"{task_name}\"."),
            link: Some(format!("/tasks/{task_id}")),
        }
    }
}
