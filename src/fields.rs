//! Enumerations and field types for tasks, submissions and users.
//!
//! This module defines the structured values used to classify work items:
//! task status, the derived task type, submission status, requirement kinds,
//! data-entry kinds, and the user roles and departments used for reporting.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Draft,
    Active,
    #[serde(rename = "Pending Review")]
    PendingReview,
    #[serde(alias = "Approved")]
    Completed,
    Rejected,
    Overdue,
}

impl TaskStatus {
    /// Whether a field user may submit against a task in this status.
    pub fn accepts_submission(self) -> bool {
        matches!(self, TaskStatus::Active | TaskStatus::Overdue | TaskStatus::Rejected)
    }

    pub fn is_complete(self) -> bool {
        self == TaskStatus::Completed
    }
}

/// Task classification. Always computed from the requirement set, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
pub enum TaskType {
    Checklist,
    #[serde(rename = "Data Entry")]
    DataEntry,
    Image,
    Mixed,
    #[serde(rename = "Visual Standard")]
    VisualStandard,
}

/// Review status of a submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
pub enum SubmissionStatus {
    #[serde(rename = "Pending Review")]
    PendingReview,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SubmissionStatus::PendingReview)
    }
}

/// Discriminant of a requirement; matches the serialised `type` tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementKind {
    Image,
    DataEntry,
    Checklist,
    PdfStandard,
}

/// How a data-entry requirement is answered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    #[default]
    Text,
    Single,
    Multiple,
}

/// User role. Not an authentication identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
pub enum Role {
    Admin,
    Manager,
    Auditor,
}

/// Department a user belongs to; tasks are attributed to the assigning user's department.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Department {
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "PLANNING")]
    Planning,
    #[serde(rename = "SPA/MKT")]
    SpaMkt,
    #[serde(rename = "IMPROVEMENT")]
    Improvement,
    #[serde(rename = "HQ/Control")]
    HqControl,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Admin,
        Department::Planning,
        Department::SpaMkt,
        Department::Improvement,
        Department::HqControl,
    ];
}

/// Due-date filters for task lists.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DueFilter {
    Today,
    ThisWeek,
    Overdue,
}

/// Available sorting options for task lists.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortKey {
    Due,
    Id,
    Status,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Draft => "Draft",
            TaskStatus::Active => "Active",
            TaskStatus::PendingReview => "Pending Review",
            TaskStatus::Completed => "Completed",
            TaskStatus::Rejected => "Rejected",
            TaskStatus::Overdue => "Overdue",
        })
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskType::Checklist => "Checklist",
            TaskType::DataEntry => "Data Entry",
            TaskType::Image => "Image",
            TaskType::Mixed => "Mixed",
            TaskType::VisualStandard => "Visual Standard",
        })
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubmissionStatus::PendingReview => "Pending Review",
            SubmissionStatus::Approved => "Approved",
            SubmissionStatus::Rejected => "Rejected",
        })
    }
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequirementKind::Image => "image",
            RequirementKind::DataEntry => "data-entry",
            RequirementKind::Checklist => "checklist",
            RequirementKind::PdfStandard => "pdf-standard",
        })
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Department::Admin => "ADMIN",
            Department::Planning => "PLANNING",
            Department::SpaMkt => "SPA/MKT",
            Department::Improvement => "IMPROVEMENT",
            Department::HqControl => "HQ/Control",
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Auditor => "Auditor",
        })
    }
}
