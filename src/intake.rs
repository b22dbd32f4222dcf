//! Submission intake: turning a field user's entries into a [`Submission`].
//!
//! Entries are checked against the task's requirements, photos paired with a
//! visual standard are sent to the validator, and only when everything passes
//! is the submission stored and the task moved to Pending Review. A refused
//! submission leaves the store untouched and the caller's input intact.

use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::Repository;
use crate::error::{Error, FieldError, Result};
use crate::fields::{EntryType, SubmissionStatus, TaskStatus};
use crate::submission::{ChecklistOutcome, ResultValue, Submission, SubmissionResult};
use crate::task::{Requirement, RequirementBody, RequirementId, Task};
use crate::validation::{
    is_base64_data_uri, resolve_standard_url, validate_with_policy, ValidationPolicy, VisualStandardRequest,
    VisualStandardValidator,
};

const DEFAULT_FAILURE_REASON: &str = "The photo does not match the visual standard.";

/// What a field user entered for one requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputValue {
    Text(String),
    Choice(String),
    Choices(Vec<String>),
    /// Image references: URLs or data URIs.
    Images(Vec<String>),
    Checklist(Vec<ChecklistOutcome>),
}

/// A field user's entries for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionInput {
    pub task_id: String,
    pub submitted_by: String,
    pub store: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub values: BTreeMap<RequirementId, InputValue>,
}

/// Settings for the validation step of intake.
#[derive(Debug, Clone, Default)]
pub struct IntakeOptions {
    pub policy: ValidationPolicy,
    /// Base for resolving relative standard document URLs.
    pub standards_base_url: Option<String>,
}

/// Validate `input` and record it as a new submission awaiting review.
pub async fn submit<R: Repository + ?Sized>(
    repo: &mut R,
    validator: &dyn VisualStandardValidator,
    options: &IntakeOptions,
    input: &SubmissionInput,
    now: NaiveDateTime,
) -> Result<Submission> {
    let task = repo.task(&input.task_id)?.clone();
    check_submittable(repo, &task)?;

    let mut errors = Vec::new();
    if input.submitted_by.trim().is_empty() {
        errors.push(FieldError::new("submitted_by", "Submitter is required."));
    }
    if input.store.trim().is_empty() {
        errors.push(FieldError::new("store", "Store is required."));
    }
    let results = build_results(&task, &input.values, &mut errors);
    let checks = standard_checks(&task, &input.values, options.standards_base_url.as_deref(), &mut errors);
    if !errors.is_empty() {
        warn!(task = %task.id, errors = errors.len(), "submission refused");
        return Err(Error::Validation(errors));
    }

    for request in &checks {
        let response = validate_with_policy(validator, request, &options.policy)
            .await
            .map_err(|e| Error::ValidationUnavailable(e.to_string()))?;
        if !response.is_ok() {
            let reason = response.failure_reason.unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string());
            warn!(task = %task.id, %reason, "photo does not meet visual standard");
            return Err(Error::StandardNotMet { reason, zones: response.failed_zones.unwrap_or_default() });
        }
    }

    let submission = Submission {
        id: repo.next_submission_id(),
        task_id: task.id.clone(),
        task_name: task.name.clone(),
        store: input.store.trim().to_string(),
        submitted_by: input.submitted_by.trim().to_string(),
        date: input.date,
        status: SubmissionStatus::PendingReview,
        results,
        feedback: None,
        reviewed_at_utc: None,
    };
    repo.insert_submission(submission.clone());

    let stored = repo.task_mut(&task.id)?;
    stored.status = TaskStatus::PendingReview;
    stored.updated_at_utc = now.and_utc().timestamp();

    info!(submission = %submission.id, task = %task.id, store = %submission.store, "submission recorded");
    Ok(submission)
}

fn check_submittable<R: Repository + ?Sized>(repo: &R, task: &Task) -> Result<()> {
    if let Some(live) = repo.live_submission_for(&task.id) {
        return Err(Error::LiveSubmissionExists { task_id: task.id.clone(), submission_id: live.id.clone() });
    }
    match task.status {
        s if s.accepts_submission() => Ok(()),
        TaskStatus::Completed => Err(Error::NotActionable { id: task.id.clone(), status: task.status }),
        from => Err(Error::InvalidTransition { id: task.id.clone(), from, action: "submit" }),
    }
}

/// One result per fulfilled requirement, in requirement order.
fn build_results(
    task: &Task,
    values: &BTreeMap<RequirementId, InputValue>,
    errors: &mut Vec<FieldError>,
) -> Vec<SubmissionResult> {
    for id in values.keys() {
        if task.requirement(*id).is_none() {
            errors.push(FieldError::new(format!("values[{id}]"), "No such requirement on this task."));
        }
    }

    let mut results = Vec::new();
    for req in &task.requirements {
        let field = format!("values[{}]", req.id);
        let value = values.get(&req.id);
        if let RequirementBody::PdfStandard { .. } = req.body {
            if value.is_some() {
                errors.push(FieldError::new(field, "A visual standard takes no value."));
            }
            continue;
        }
        let Some(value) = value else {
            errors.push(FieldError::new(field, format!("\"{}\" is required.", req.label)));
            continue;
        };
        match check_value(req, value) {
            Ok(value) => results.push(SubmissionResult { requirement_id: req.id, kind: req.kind(), value }),
            Err(message) => errors.push(FieldError::new(field, message)),
        }
    }
    results
}

fn check_value(req: &Requirement, value: &InputValue) -> std::result::Result<ResultValue, String> {
    match (&req.body, value) {
        (RequirementBody::Image { min, max }, InputValue::Images(images)) => {
            let n = images.len() as u32;
            if n < *min || n > *max {
                return Err(format!("Requires {min}-{max} image(s), got {n}."));
            }
            if images.iter().any(|i| i.trim().is_empty()) {
                return Err("Image reference cannot be empty.".into());
            }
            Ok(ResultValue::List(images.clone()))
        }
        (RequirementBody::DataEntry { entry_type: EntryType::Text, .. }, InputValue::Text(text)) => {
            if text.trim().is_empty() {
                return Err("Enter a value.".into());
            }
            Ok(ResultValue::Text(text.clone()))
        }
        (RequirementBody::DataEntry { entry_type: EntryType::Single, options }, InputValue::Choice(choice)) => {
            if !options.iter().any(|o| &o.text == choice) {
                return Err(format!("\"{choice}\" is not one of the options."));
            }
            Ok(ResultValue::Text(choice.clone()))
        }
        (RequirementBody::DataEntry { entry_type: EntryType::Multiple, options }, InputValue::Choices(choices)) => {
            let mut seen = HashSet::new();
            for choice in choices {
                if !options.iter().any(|o| &o.text == choice) {
                    return Err(format!("\"{choice}\" is not one of the options."));
                }
                if !seen.insert(choice) {
                    return Err(format!("\"{choice}\" selected twice."));
                }
            }
            Ok(ResultValue::List(choices.clone()))
        }
        (RequirementBody::Checklist { checklist_items }, InputValue::Checklist(outcomes)) => {
            let matches = outcomes.len() == checklist_items.len()
                && outcomes.iter().zip(checklist_items).all(|(o, item)| o.text == item.text);
            if !matches {
                return Err("Checklist outcomes must cover every item, in order.".into());
            }
            Ok(ResultValue::Checklist(outcomes.clone()))
        }
        (body, _) => Err(format!("Expected {} value.", expected_value(body))),
    }
}

fn expected_value(body: &RequirementBody) -> &'static str {
    match body {
        RequirementBody::Image { .. } => "an images",
        RequirementBody::DataEntry { entry_type: EntryType::Text, .. } => "a text",
        RequirementBody::DataEntry { entry_type: EntryType::Single, .. } => "a choice",
        RequirementBody::DataEntry { entry_type: EntryType::Multiple, .. } => "a choices",
        RequirementBody::Checklist { .. } => "a checklist",
        RequirementBody::PdfStandard { .. } => "no",
    }
}

/// Build one validator request per visual standard on the task.
///
/// Each standard is compared with the nearest image requirement after it,
/// or failing that the nearest one before it.
fn standard_checks(
    task: &Task,
    values: &BTreeMap<RequirementId, InputValue>,
    base_url: Option<&str>,
    errors: &mut Vec<FieldError>,
) -> Vec<VisualStandardRequest> {
    let mut checks = Vec::new();
    for (pos, req) in task.requirements.iter().enumerate() {
        let RequirementBody::PdfStandard { pdf_url } = &req.body else {
            continue;
        };
        let field = format!("values[{}]", req.id);
        let is_image = |r: &&Requirement| matches!(r.body, RequirementBody::Image { .. });
        let paired = task.requirements[pos + 1..]
            .iter()
            .find(is_image)
            .or_else(|| task.requirements[..pos].iter().rev().find(is_image));
        let Some(image_req) = paired else {
            errors.push(FieldError::new(field, "No photo requirement to compare with this standard."));
            continue;
        };
        let Some(url) = resolve_standard_url(pdf_url, base_url) else {
            errors.push(FieldError::new(field, format!("Standard URL \"{pdf_url}\" cannot be resolved to an absolute URL.")));
            continue;
        };
        // A missing or malformed photo list is already reported by build_results.
        let Some(InputValue::Images(images)) = values.get(&image_req.id) else {
            continue;
        };
        let image_field = format!("values[{}]", image_req.id);
        match images.first() {
            Some(photo) if is_base64_data_uri(photo) => checks.push(VisualStandardRequest {
                photo_data_uri: photo.clone(),
                standard_pdf_url: url,
            }),
            Some(_) => errors.push(FieldError::new(image_field, "Photo compared with a standard must be a base64 data URI.")),
            // An image count below the minimum is already reported.
            None if errors.iter().any(|e| e.field == image_field) => {}
            None => errors.push(FieldError::new(image_field, "A photo is required to compare with the standard.")),
        }
    }
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::factory::{create_task, publish_task, TaskDraft};
    use crate::fields::RequirementKind;
    use crate::task::NewRequirement;
    use crate::validation::{photo_data_uri, MockValidator, ValidatorError, VisualStandardResponse};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl VisualStandardValidator for Unreachable {
        async fn validate(&self, _: &VisualStandardRequest) -> std::result::Result<VisualStandardResponse, ValidatorError> {
            Err(ValidatorError::Transport("connection refused".into()))
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 19).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    fn options() -> IntakeOptions {
        IntakeOptions {
            policy: ValidationPolicy { max_attempts: 2, backoff: Duration::from_millis(1), ..ValidationPolicy::default() },
            standards_base_url: Some("https://standards.example.com".into()),
        }
    }

    fn active_task(db: &mut Database, reqs: &[&str]) -> Task {
        let draft = TaskDraft {
            name: "In-Store Customer Survey".into(),
            assignee: Some("Store A".into()),
            due_date: NaiveDate::from_ymd_opt(2024, 8, 10),
            requirements: reqs.iter().map(|r| r.parse::<NewRequirement>().unwrap()).collect(),
            ..TaskDraft::default()
        };
        let task = create_task(db, draft, now()).unwrap();
        publish_task(db, &task.id, now()).unwrap();
        db.task(&task.id).unwrap().clone()
    }

    fn input(task: &Task, values: Vec<(u32, InputValue)>) -> SubmissionInput {
        SubmissionInput {
            task_id: task.id.clone(),
            submitted_by: "User 2".into(),
            store: "Store A".into(),
            date: now().date(),
            values: values.into_iter().map(|(k, v)| (RequirementId(k), v)).collect(),
        }
    }

    fn survey(db: &mut Database) -> Task {
        active_task(
            db,
            &[
                "single:Overall experience:Excellent|Good|Average|Poor",
                "multiple:What did you like:Product Selection|Store Cleanliness|Staff Friendliness",
                "text:Comments",
                "checklist:Setup:Banner visible|Wobblers attached",
            ],
        )
    }

    fn survey_values() -> Vec<(u32, InputValue)> {
        vec![
            (0, InputValue::Choice("Good".into())),
            (1, InputValue::Choices(vec!["Product Selection".into(), "Staff Friendliness".into()])),
            (2, InputValue::Text("Friendly staff".into())),
            (
                3,
                InputValue::Checklist(vec![
                    ChecklistOutcome { text: "Banner visible".into(), pass: true, reason: None },
                    ChecklistOutcome { text: "Wobblers attached".into(), pass: false, reason: Some("Out of stock".into()) },
                ]),
            ),
        ]
    }

    #[tokio::test]
    async fn test_submit_records_results_and_moves_task() {
        let mut db = Database::default();
        let task = survey(&mut db);
        let sub = submit(&mut db, &MockValidator::default(), &options(), &input(&task, survey_values()), now())
            .await
            .unwrap();

        assert_eq!(sub.id, "SUB-001");
        assert_eq!(sub.status, SubmissionStatus::PendingReview);
        assert_eq!(sub.results.len(), 4);
        assert_eq!(sub.results[0].value, ResultValue::Text("Good".into()));
        assert!(matches!(sub.results[1].value, ResultValue::List(ref v) if v.len() == 2));
        match &sub.result_for(RequirementId(3)).unwrap().value {
            ResultValue::Checklist(items) => assert!(!items[1].pass),
            other => panic!("expected checklist, got {other:?}"),
        }
        assert_eq!(db.task(&task.id).unwrap().status, TaskStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_bad_values_refused_without_mutation() {
        let mut db = Database::default();
        let task = survey(&mut db);
        let values = vec![
            (0, InputValue::Choice("Terrible".into())),
            (1, InputValue::Choices(vec!["Product Selection".into(), "Product Selection".into()])),
            (3, InputValue::Text("all good".into())),
            (9, InputValue::Text("?".into())),
        ];
        let err = submit(&mut db, &MockValidator::default(), &options(), &input(&task, values), now())
            .await
            .unwrap_err();
        let fields: Vec<&str> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["values[9]", "values[0]", "values[1]", "values[2]", "values[3]"]);
        assert!(db.submissions.is_empty());
        assert_eq!(db.task(&task.id).unwrap().status, TaskStatus::Active);
    }

    #[tokio::test]
    async fn test_image_bounds() {
        let mut db = Database::default();
        let task = active_task(&mut db, &["image:Entrance display:1:2"]);
        let three = InputValue::Images(vec!["a.jpg".into(), "b.jpg".into(), "c.jpg".into()]);
        let err = submit(&mut db, &MockValidator::default(), &options(), &input(&task, vec![(0, three)]), now())
            .await
            .unwrap_err();
        assert!(err.field_errors()[0].message.contains("1-2"));

        let two = InputValue::Images(vec!["a.jpg".into(), "b.jpg".into()]);
        let sub = submit(&mut db, &MockValidator::default(), &options(), &input(&task, vec![(0, two)]), now())
            .await
            .unwrap();
        assert_eq!(sub.results[0].kind, RequirementKind::Image);
    }

    #[tokio::test]
    async fn test_one_live_submission_per_task() {
        let mut db = Database::default();
        let task = active_task(&mut db, &["text:Stock"]);
        let entry = input(&task, vec![(0, InputValue::Text("42".into()))]);
        submit(&mut db, &MockValidator::default(), &options(), &entry, now()).await.unwrap();
        let err = submit(&mut db, &MockValidator::default(), &options(), &entry, now()).await.unwrap_err();
        assert!(matches!(err, Error::LiveSubmissionExists { .. }));
        assert_eq!(db.submissions.len(), 1);
    }

    #[tokio::test]
    async fn test_draft_and_completed_tasks_refuse_submissions() {
        let mut db = Database::default();
        let draft = TaskDraft {
            name: "Customer Feedback Survey".into(),
            assignee: Some("Store C, Store D".into()),
            due_date: NaiveDate::from_ymd_opt(2024, 8, 5),
            ..TaskDraft::default()
        };
        let task = create_task(&mut db, draft, now()).unwrap();
        let err = submit(&mut db, &MockValidator::default(), &options(), &input(&task, vec![]), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { from: TaskStatus::Draft, .. }));

        db.task_mut(&task.id).unwrap().status = TaskStatus::Completed;
        let err = submit(&mut db, &MockValidator::default(), &options(), &input(&task, vec![]), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotActionable { .. }));
        assert_eq!(db.task(&task.id).unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visual_standard_not_met_blocks_submission() {
        let mut db = Database::default();
        let task = active_task(&mut db, &["pdf:Bookshelf standard:/standards/bookshelf-standard.pdf", "image:Bookshelf photo:1:1"]);
        let photo = InputValue::Images(vec![photo_data_uri("image/jpeg", b"jpeg bytes")]);
        let entry = input(&task, vec![(1, photo)]);

        let err = submit(&mut db, &MockValidator::default(), &options(), &entry, now()).await.unwrap_err();
        match err {
            Error::StandardNotMet { zones, .. } => assert_eq!(zones[0].zone_id, "floor-1"),
            other => panic!("expected StandardNotMet, got {other:?}"),
        }
        assert!(db.submissions.is_empty());
        assert_eq!(db.task(&task.id).unwrap().status, TaskStatus::Active);
        // The entry is still the caller's to retry with.
        assert_eq!(entry.values.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visual_standard_ok_submits() {
        let mut db = Database::default();
        let task = active_task(&mut db, &["image:Shelf photo:1:1", "pdf:Standard:https://cdn.example.com/ok-standard.pdf"]);
        let photo = InputValue::Images(vec![photo_data_uri("image/png", b"png bytes")]);
        let sub = submit(&mut db, &MockValidator::default(), &options(), &input(&task, vec![(0, photo)]), now())
            .await
            .unwrap();
        assert_eq!(sub.results.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_validator_is_retryable() {
        let mut db = Database::default();
        let task = active_task(&mut db, &["pdf:Standard:/standards/ok-standard.pdf", "image:Photo:1:1"]);
        let photo = InputValue::Images(vec![photo_data_uri("image/png", b"png bytes")]);
        let err = submit(&mut db, &Unreachable, &options(), &input(&task, vec![(1, photo)]), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationUnavailable(_)));
        assert!(err.is_retryable());
        assert!(db.submissions.is_empty());
    }

    #[tokio::test]
    async fn test_standard_photo_must_be_data_uri() {
        let mut db = Database::default();
        let task = active_task(&mut db, &["pdf:Standard:/standards/ok-standard.pdf", "image:Photo:1:1"]);
        let photo = InputValue::Images(vec!["https://picsum.photos/seed/101/800/600".into()]);
        let err = submit(&mut db, &MockValidator::default(), &options(), &input(&task, vec![(1, photo)]), now())
            .await
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "values[1]");
    }

    #[tokio::test]
    async fn test_standard_needs_a_photo_even_when_optional() {
        let mut db = Database::default();
        let task = active_task(&mut db, &["pdf:Standard:/standards/bookshelf-standard.pdf", "image:Photo:0:1"]);
        let err = submit(
            &mut db,
            &MockValidator::new(Duration::ZERO),
            &options(),
            &input(&task, vec![(1, InputValue::Images(Vec::new()))]),
            now(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.field_errors().len(), 1);
        assert_eq!(err.field_errors()[0].field, "values[1]");
        assert!(db.submissions.is_empty());
        assert_eq!(db.task(&task.id).unwrap().status, TaskStatus::Active);
    }

    #[tokio::test]
    async fn test_rejected_task_can_be_resubmitted() {
        let mut db = Database::default();
        let task = active_task(&mut db, &["text:SKU-101 Price"]);
        let entry = input(&task, vec![(0, InputValue::Text("4.99".into()))]);
        let first = submit(&mut db, &MockValidator::default(), &options(), &entry, now()).await.unwrap();
        crate::review::reject(&mut db, &first.id, "Price is out of date", now()).unwrap();
        assert_eq!(db.task(&task.id).unwrap().status, TaskStatus::Rejected);

        let second = submit(&mut db, &MockValidator::default(), &options(), &entry, now()).await.unwrap();
        assert_eq!(second.id, "SUB-002");
        assert_eq!(db.task(&task.id).unwrap().status, TaskStatus::PendingReview);
    }
}
