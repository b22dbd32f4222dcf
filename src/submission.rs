//! Submission data structures.
//!
//! A submission records one field user's fulfilment of a task's requirements.
//! Results reference requirements by their stable [`RequirementId`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fields::{RequirementKind, SubmissionStatus};
use crate::task::RequirementId;

/// Pass/fail outcome for one checklist line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistOutcome {
    pub text: String,
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The value a field user entered for one requirement.
///
/// Single selections stay a plain string and multiple selections stay a list,
/// so cardinality survives storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Text(String),
    List(Vec<String>),
    Checklist(Vec<ChecklistOutcome>),
}

/// A single requirement's result within a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub requirement_id: RequirementId,
    #[serde(rename = "type")]
    pub kind: RequirementKind,
    pub value: ResultValue,
}

/// A field user's submission against a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub task_id: String,
    pub task_name: String,
    pub store: String,
    pub submitted_by: String,
    pub date: NaiveDate,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub results: Vec<SubmissionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at_utc: Option<i64>,
}

impl Submission {
    pub fn result_for(&self, id: RequirementId) -> Option<&SubmissionResult> {
        self.results.iter().find(|r| r.requirement_id == id)
    }

    pub fn is_pending(&self) -> bool {
        self.status == SubmissionStatus::PendingReview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_value_shapes() {
        let single: ResultValue = serde_json::from_str("\"Good\"").unwrap();
        assert_eq!(single, ResultValue::Text("Good".into()));

        let multi: ResultValue = serde_json::from_str("[\"Product Selection\",\"Store Cleanliness\"]").unwrap();
        assert!(matches!(multi, ResultValue::List(ref v) if v.len() == 2));

        let checklist: ResultValue =
            serde_json::from_str("[{\"text\":\"Floor is clean.\",\"pass\":false,\"reason\":\"Spill\"}]").unwrap();
        match checklist {
            ResultValue::Checklist(items) => {
                assert!(!items[0].pass);
                assert_eq!(items[0].reason.as_deref(), Some("Spill"));
            }
            other => panic!("expected checklist, got {other:?}"),
        }
    }

    #[test]
    fn test_submission_result_wire_shape() {
        let r = SubmissionResult {
            requirement_id: RequirementId(1),
            kind: RequirementKind::Checklist,
            value: ResultValue::Checklist(vec![ChecklistOutcome { text: "A".into(), pass: true, reason: None }]),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["requirementId"], 1);
        assert_eq!(v["type"], "checklist");
        assert_eq!(v["value"][0]["pass"], true);
    }
}
