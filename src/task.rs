//! Task data structure and the requirement model.
//!
//! A task is one unit of field work assigned to a store or group of stores.
//! Its requirements describe what a submission must contain. Each requirement
//! carries an id that the task hands out once and never reuses, so submission
//! results keep pointing at the right requirement after the list is edited.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::fields::*;

/// The assignee string that targets every store.
pub const ALL_STORES: &str = "All Stores";

/// Stable identifier of a requirement within its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementId(pub u32);

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a task is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Assignee {
    AllStores,
    /// A single store or a named group of stores.
    Named(String),
}

impl Assignee {
    /// Whether a task with this assignee applies to `store`.
    pub fn applies_to(&self, store: &str) -> bool {
        match self {
            Assignee::AllStores => true,
            Assignee::Named(name) => name == store,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Assignee::AllStores => ALL_STORES,
            Assignee::Named(name) => name,
        }
    }
}

impl From<String> for Assignee {
    fn from(s: String) -> Self {
        if s == ALL_STORES {
            Assignee::AllStores
        } else {
            Assignee::Named(s)
        }
    }
}

impl From<Assignee> for String {
    fn from(a: Assignee) -> Self {
        match a {
            Assignee::AllStores => ALL_STORES.to_string(),
            Assignee::Named(name) => name,
        }
    }
}

impl fmt::Display for Assignee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One selectable option of a single/multiple data-entry requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub text: String,
}

/// One line of a checklist requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
}

/// Kind-specific content of a requirement, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RequirementBody {
    Image {
        min: u32,
        max: u32,
    },
    #[serde(rename_all = "camelCase")]
    DataEntry {
        #[serde(default)]
        entry_type: EntryType,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<ChoiceOption>,
    },
    #[serde(rename_all = "camelCase")]
    Checklist {
        checklist_items: Vec<ChecklistItem>,
    },
    #[serde(rename_all = "camelCase")]
    PdfStandard {
        pdf_url: String,
    },
}

impl RequirementBody {
    pub fn kind(&self) -> RequirementKind {
        match self {
            RequirementBody::Image { .. } => RequirementKind::Image,
            RequirementBody::DataEntry { .. } => RequirementKind::DataEntry,
            RequirementBody::Checklist { .. } => RequirementKind::Checklist,
            RequirementBody::PdfStandard { .. } => RequirementKind::PdfStandard,
        }
    }
}

/// A requirement as entered on the creation form, before the task assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequirement {
    pub label: String,
    #[serde(flatten)]
    pub body: RequirementBody,
}

/// What a submission must contain for one part of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: RequirementId,
    pub label: String,
    #[serde(flatten)]
    pub body: RequirementBody,
}

impl Requirement {
    pub fn kind(&self) -> RequirementKind {
        self.body.kind()
    }
}

/// A unit of field work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub store: Assignee,
    pub due: NaiveDateTime,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_end: Option<NaiveDate>,
    /// Id of the user who assigned the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
    pub created_at_utc: i64,
    pub updated_at_utc: i64,
    #[serde(default)]
    next_requirement_id: u32,
}

impl Task {
    /// Build a task shell with no requirements.
    pub fn new(id: String, name: String, store: Assignee, due: NaiveDateTime, now_utc: i64) -> Self {
        Task {
            id,
            name,
            store,
            due,
            status: TaskStatus::Draft,
            description: None,
            requirements: Vec::new(),
            is_recurring: false,
            repeat_end: None,
            assigned_by: None,
            created_at_utc: now_utc,
            updated_at_utc: now_utc,
            next_requirement_id: 0,
        }
    }

    /// The task's classification, derived from its current requirements.
    pub fn task_type(&self) -> TaskType {
        derive_task_type(self.requirements.iter().map(Requirement::kind))
    }

    /// Append a requirement, assigning it the next unused id.
    pub fn push_requirement(&mut self, new: NewRequirement) -> RequirementId {
        // Loaded files may predate the counter; never hand out an id already in use.
        let floor = self.requirements.iter().map(|r| r.id.0 + 1).max().unwrap_or(0);
        let id = RequirementId(self.next_requirement_id.max(floor));
        self.next_requirement_id = id.0 + 1;
        self.requirements.push(Requirement { id, label: new.label, body: new.body });
        id
    }

    pub fn requirement(&self, id: RequirementId) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.id == id)
    }

    pub fn position_of(&self, id: RequirementId) -> Option<usize> {
        self.requirements.iter().position(|r| r.id == id)
    }

    pub fn is_overdue_at(&self, now: NaiveDateTime) -> bool {
        self.status == TaskStatus::Active && self.due < now
    }
}

/// Classify a task from the kinds of its requirements.
///
/// A pdf-standard anywhere makes it a Visual Standard task; otherwise two or
/// more distinct kinds make it Mixed; a single kind maps directly; no
/// requirements at all default to Data Entry.
pub fn derive_task_type<I>(kinds: I) -> TaskType
where
    I: IntoIterator<Item = RequirementKind>,
{
    let kinds: BTreeSet<RequirementKind> = kinds.into_iter().collect();
    if kinds.contains(&RequirementKind::PdfStandard) {
        return TaskType::VisualStandard;
    }
    if kinds.len() > 1 {
        return TaskType::Mixed;
    }
    match kinds.iter().next() {
        Some(RequirementKind::Image) => TaskType::Image,
        Some(RequirementKind::Checklist) => TaskType::Checklist,
        Some(RequirementKind::DataEntry) | Some(RequirementKind::PdfStandard) | None => TaskType::DataEntry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn image(label: &str) -> NewRequirement {
        NewRequirement { label: label.into(), body: RequirementBody::Image { min: 1, max: 1 } }
    }

    fn checklist(label: &str) -> NewRequirement {
        NewRequirement {
            label: label.into(),
            body: RequirementBody::Checklist { checklist_items: vec![ChecklistItem { text: "Floor is clean.".into() }] },
        }
    }

    fn task() -> Task {
        let due = NaiveDate::from_ymd_opt(2024, 8, 15).unwrap().and_hms_opt(23, 59, 0).unwrap();
        Task::new("TSK-001".into(), "Bookshelf Standard Check".into(), Assignee::Named("Store A".into()), due, 0)
    }

    #[test]
    fn test_image_and_checklist_is_mixed() {
        let mut t = task();
        t.push_requirement(image("Photo"));
        t.push_requirement(checklist("Audit"));
        assert_eq!(t.task_type(), TaskType::Mixed);
    }

    #[test]
    fn test_type_follows_requirement_edits() {
        let mut t = task();
        assert_eq!(t.task_type(), TaskType::DataEntry);
        t.push_requirement(image("Photo"));
        assert_eq!(t.task_type(), TaskType::Image);
        t.push_requirement(NewRequirement {
            label: "Standard".into(),
            body: RequirementBody::PdfStandard { pdf_url: "/standards/bookshelf-standard.pdf".into() },
        });
        assert_eq!(t.task_type(), TaskType::VisualStandard);
        t.requirements.retain(|r| r.kind() != RequirementKind::PdfStandard);
        assert_eq!(t.task_type(), TaskType::Image);
    }

    #[test]
    fn test_requirement_ids_are_not_reused() {
        let mut t = task();
        let a = t.push_requirement(image("A"));
        let b = t.push_requirement(checklist("B"));
        t.requirements.retain(|r| r.id != b);
        let c = t.push_requirement(image("C"));
        assert_eq!(a, RequirementId(0));
        assert_eq!(c, RequirementId(2));
        t.requirements.reverse();
        assert_eq!(t.requirement(a).unwrap().label, "A");
        assert_eq!(t.position_of(a), Some(1));
    }

    #[test]
    fn test_assignee_round_trips_as_plain_string() {
        assert_eq!(serde_json::to_string(&Assignee::AllStores).unwrap(), "\"All Stores\"");
        let a: Assignee = serde_json::from_str("\"Stores Group A\"").unwrap();
        assert_eq!(a, Assignee::Named("Stores Group A".into()));
        assert!(Assignee::AllStores.applies_to("Store B"));
        assert!(!a.applies_to("Store B"));
    }

    #[test]
    fn test_requirement_wire_shape() {
        let req = Requirement {
            id: RequirementId(3),
            label: "Survey".into(),
            body: RequirementBody::DataEntry {
                entry_type: EntryType::Single,
                options: vec![ChoiceOption { text: "Good".into() }],
            },
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["type"], "data-entry");
        assert_eq!(v["entryType"], "single");
        assert_eq!(v["options"][0]["text"], "Good");
        assert_eq!(v["id"], 3);
        let back: Requirement = serde_json::from_value(v).unwrap();
        assert_eq!(back, req);
    }

    fn kind_strategy() -> impl Strategy<Value = RequirementKind> {
        prop_oneof![
            Just(RequirementKind::Image),
            Just(RequirementKind::DataEntry),
            Just(RequirementKind::Checklist),
            Just(RequirementKind::PdfStandard),
        ]
    }

    proptest! {
        #[test]
        fn prop_type_depends_only_on_distinct_kinds(kinds in proptest::collection::vec(kind_strategy(), 0..8)) {
            let distinct: BTreeSet<_> = kinds.iter().copied().collect();
            let derived = derive_task_type(kinds.clone());
            prop_assert_eq!(derived, derive_task_type(distinct.iter().copied()));
            let mut reversed = kinds.clone();
            reversed.reverse();
            prop_assert_eq!(derived, derive_task_type(reversed));

            let expected = if distinct.contains(&RequirementKind::PdfStandard) {
                TaskType::VisualStandard
            } else if distinct.len() >= 2 {
                TaskType::Mixed
            } else if distinct.contains(&RequirementKind::Image) {
                TaskType::Image
            } else if distinct.contains(&RequirementKind::Checklist) {
                TaskType::Checklist
            } else {
                TaskType::DataEntry
            };
            prop_assert_eq!(derived, expected);
        }
    }
}
