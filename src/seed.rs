//! Demo data: a small retail chain with tasks in every state.
//!
//! Dates are laid out relative to the seeding day so the data set stays
//! current. Tasks go through the same draft validation as user-created ones.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::info;

use crate::db::{Database, Repository};
use crate::error::Result;
use crate::factory::{create_task, TaskDraft};
use crate::fields::{Department, Role, SubmissionStatus, TaskStatus};
use crate::notify::NewNotification;
use crate::submission::{ChecklistOutcome, ResultValue, Submission, SubmissionResult};
use crate::task::NewRequirement;
use crate::user::User;

/// Counts of what [`seed`] created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub tasks: usize,
    pub submissions: usize,
    pub notifications: usize,
}

struct TaskSeed {
    name: &'static str,
    store: &'static str,
    due_in_days: i64,
    status: TaskStatus,
    description: &'static str,
    requirements: &'static [&'static str],
    recurring: bool,
    assigned_by: &'static str,
}

const TASKS: &[TaskSeed] = &[
    TaskSeed {
        name: "Weekly Display Check",
        store: "All Stores",
        due_in_days: 1,
        status: TaskStatus::PendingReview,
        description: "Ensure all weekly promotional displays are set up correctly and are neat and tidy.\n\n\
            - The main promotional banner should be visible from the store entrance.\n\
            - Promotional materials should not be damaged.\n\
            - All prices must be correct and clearly visible.",
        requirements: &[
            "checklist:Display Audit:Main banner is visible from entrance.|Promotional materials are not damaged.|All prices are correct and visible.",
            "image:Photo of the main display:1:1",
        ],
        recurring: true,
        assigned_by: "USR-002",
    },
    TaskSeed {
        name: "End-of-Month Stock Count",
        store: "All Stores",
        due_in_days: 7,
        status: TaskStatus::PendingReview,
        description: "Perform a full stock count of all items in the warehouse and on the shelves. \
            Submit the final counts via the data entry form.",
        requirements: &["text:SKU-123 Stock", "text:SKU-456 Stock"],
        recurring: false,
        assigned_by: "USR-005",
    },
    TaskSeed {
        name: "New Campaign POSM Setup",
        store: "Stores Group A",
        due_in_days: -4,
        status: TaskStatus::PendingReview,
        description: "Set up the Point of Sale Materials for the new \"Summer Sale\" campaign. \
            Submit a photo of the final setup for review.",
        requirements: &[
            "image:Photo of the main entrance display:1:2",
            "checklist:Setup Checklist:Main banner is visible from entrance.|Wobblers are attached to featured products.|Brochures are available at the counter.",
        ],
        recurring: false,
        assigned_by: "USR-003",
    },
    TaskSeed {
        name: "Customer Feedback Survey",
        store: "Store C, Store D",
        due_in_days: 12,
        status: TaskStatus::Draft,
        description: "Collect customer feedback using the provided survey form. Aim for at least 20 responses per store.",
        requirements: &[],
        recurring: false,
        assigned_by: "USR-003",
    },
    TaskSeed {
        name: "Quarterly Deep Clean Audit",
        store: "All Stores",
        due_in_days: 68,
        status: TaskStatus::Active,
        description: "Conduct a thorough deep clean of the entire store, including staff areas. \
            Use the checklist to ensure all areas are covered.",
        requirements: &["checklist:Cleaning Checklist:Floors mopped and polished.|Windows and glass surfaces cleaned.|\
            Shelving wiped down and organized.|Restrooms sanitized.|Staff room cleaned."],
        recurring: false,
        assigned_by: "USR-004",
    },
    TaskSeed {
        name: "Stock Count Verification",
        store: "Store B",
        due_in_days: 22,
        status: TaskStatus::Completed,
        description: "Verify the stock count from the latest delivery and check for discrepancies.",
        requirements: &[
            "image:Photo of Delivery Note:1:1",
            "checklist:Verification Checklist:Count matches system records.|Discrepancy report filed.",
        ],
        recurring: false,
        assigned_by: "USR-005",
    },
    TaskSeed {
        name: "Cleanliness Audit Photo",
        store: "All Stores",
        due_in_days: -23,
        status: TaskStatus::PendingReview,
        description: "Submit a photo of the main customer area to verify cleanliness standards are being met.",
        requirements: &[
            "image:Photo of main customer area:1:1",
            "checklist:Cleanliness Checklist:Floor is clean.|Shelves are dust-free.",
        ],
        recurring: true,
        assigned_by: "USR-004",
    },
    TaskSeed {
        name: "Price Check",
        store: "Store B",
        due_in_days: -2,
        status: TaskStatus::Rejected,
        description: "Verify prices for 5 specific SKUs.",
        requirements: &["text:SKU-101 Price"],
        recurring: false,
        assigned_by: "USR-002",
    },
    TaskSeed {
        name: "Monthly Sales Display",
        store: "Store B",
        due_in_days: -3,
        status: TaskStatus::Completed,
        description: "Setup the new monthly sales promotion display near the entrance.",
        requirements: &["image:Photo of the sales display:1:1"],
        recurring: true,
        assigned_by: "USR-003",
    },
    TaskSeed {
        name: "Safety Compliance Check",
        store: "Store E",
        due_in_days: -1,
        status: TaskStatus::Completed,
        description: "Perform weekly safety check.",
        requirements: &["checklist:Safety Checklist:Fire extinguisher is accessible.|Emergency exits are clear."],
        recurring: false,
        assigned_by: "USR-005",
    },
    TaskSeed {
        name: "In-Store Customer Survey",
        store: "Store A",
        due_in_days: 17,
        status: TaskStatus::PendingReview,
        description: "Gather customer feedback using the survey questions below.",
        requirements: &[
            "single:How would you rate your overall experience?:Excellent|Good|Average|Poor",
            "multiple:What did you like about our store? (Select all that apply):Product Selection|Store Cleanliness|Staff Friendliness|Prices & Promotions",
            "text:Any other comments or suggestions?",
        ],
        recurring: false,
        assigned_by: "USR-003",
    },
    TaskSeed {
        name: "Bookshelf Standard Check",
        store: "Store A",
        due_in_days: 22,
        status: TaskStatus::Active,
        description: "Please set up the bookshelf according to the visual standard provided in the PDF and submit a photo.",
        requirements: &[
            "pdf:Bookshelf Display Standard:/standards/bookshelf-standard.pdf",
            "image:Photo of your completed bookshelf display:1:1",
        ],
        recurring: false,
        assigned_by: "USR-002",
    },
];

fn users() -> Vec<User> {
    let user = |id: &str, name: &str, email: &str, role: Role, department: Department, avatar: &str| User {
        id: id.into(),
        name: name.into(),
        email: email.into(),
        role,
        department,
        avatar_id: avatar.into(),
    };
    vec![
        user("USR-001", "Olivia Martin", "olivia.martin@email.com", Role::Admin, Department::Admin, "user-avatar-2"),
        user("USR-002", "Jackson Lee", "jackson.lee@email.com", Role::Manager, Department::Planning, "user-avatar-3"),
        user("USR-003", "Isabella Nguyen", "isabella.nguyen@email.com", Role::Manager, Department::SpaMkt, "user-avatar-4"),
        user("USR-004", "William Kim", "will@email.com", Role::Auditor, Department::Improvement, "user-avatar-5"),
        user("USR-005", "Sofia Davis", "sofia.davis@email.com", Role::Auditor, Department::HqControl, "user-avatar-6"),
    ]
}

fn photos(seeds: &[u32]) -> ResultValue {
    ResultValue::List(seeds.iter().map(|s| format!("https://picsum.photos/seed/{s}/800/600")).collect())
}

fn checks(items: &[(&str, bool, Option<&str>)]) -> ResultValue {
    ResultValue::Checklist(
        items
            .iter()
            .map(|(text, pass, reason)| ChecklistOutcome {
                text: (*text).into(),
                pass: *pass,
                reason: reason.map(str::to_string),
            })
            .collect(),
    )
}

fn text(s: &str) -> ResultValue {
    ResultValue::Text(s.into())
}

/// Replace the contents of `db` with the demo data set.
pub fn seed(db: &mut Database, now: NaiveDateTime) -> Result<SeedSummary> {
    *db = Database::default();
    db.users = users();

    let today = now.date();
    let mut task_ids = Vec::with_capacity(TASKS.len());
    for seed in TASKS {
        let due = today + Duration::days(seed.due_in_days);
        let draft = TaskDraft {
            name: seed.name.into(),
            assignee: Some(seed.store.into()),
            due_date: Some(due),
            due_time: None,
            description: Some(seed.description.into()),
            requirements: seed
                .requirements
                .iter()
                .map(|r| r.parse::<NewRequirement>())
                .collect::<std::result::Result<_, _>>()
                .map_err(crate::error::Error::Config)?,
            is_recurring: seed.recurring,
            repeat_end: seed.recurring.then(|| due + Duration::days(90)),
            assigned_by: Some(seed.assigned_by.into()),
        };
        let task = create_task(db, draft, now)?;
        db.task_mut(&task.id)?.status = seed.status;
        task_ids.push(task.id);
    }

    let days_ago = |n: i64| today - Duration::days(n);
    let submissions = vec![
        (2, "Store A", "User 2", days_ago(5), SubmissionStatus::PendingReview, None, vec![
            photos(&[101, 111]),
            checks(&[
                ("Main banner is visible from entrance.", true, None),
                ("Wobblers are attached to featured products.", true, None),
                ("Brochures are available at the counter.", false, Some("Ran out of stock.")),
            ]),
        ]),
        (0, "Store C", "User 4", days_ago(4), SubmissionStatus::PendingReview, None, vec![
            checks(&[
                ("Main banner is visible from entrance.", true, None),
                ("Promotional materials are not damaged.", true, None),
                ("All prices are correct and visible.", true, None),
            ]),
            photos(&[102]),
        ]),
        (5, "Store B", "User 3", days_ago(3), SubmissionStatus::Approved, None, vec![
            photos(&[103]),
            checks(&[
                ("Count matches system records.", false, Some("System shows 50, physical count is 48.")),
                ("Discrepancy report filed.", true, None),
            ]),
        ]),
        (6, "Store F", "User 10", days_ago(2), SubmissionStatus::PendingReview, None, vec![
            photos(&[104]),
            checks(&[("Floor is clean.", true, None), ("Shelves are dust-free.", true, None)]),
        ]),
        (8, "Store B", "User 3", days_ago(3), SubmissionStatus::Approved, Some("Great work, looks very appealing!"), vec![
            photos(&[105]),
        ]),
        (6, "Store D", "User 7", days_ago(5), SubmissionStatus::Rejected,
            Some("Image is blurry and the floor in the corner appears to be dirty. \
                Please retake the photo with better lighting and ensure the area is fully clean."),
            vec![photos(&[106])]),
        (9, "Store E", "User 9", days_ago(1), SubmissionStatus::Approved, None, vec![
            checks(&[("Fire extinguisher is accessible.", true, None), ("Emergency exits are clear.", true, None)]),
        ]),
        (7, "Store B", "User 3", days_ago(2), SubmissionStatus::Rejected,
            Some("The price for SKU-101 is incorrect in your submission. \
                Please verify against the master price list and resubmit."),
            vec![text("25.99")]),
        (1, "Store A", "User 2", today, SubmissionStatus::PendingReview, None, vec![text("152"), text("348")]),
        (10, "Store A", "User 2", today, SubmissionStatus::PendingReview, None, vec![
            text("Good"),
            ResultValue::List(vec!["Store Cleanliness".into(), "Staff Friendliness".into()]),
            text("The music was a bit too loud, but the staff were very helpful."),
        ]),
    ];

    for (task_index, store, by, date, status, feedback, values) in submissions {
        let task = db.task(&task_ids[task_index])?.clone();
        let results = task
            .requirements
            .iter()
            .zip(values)
            .map(|(req, value)| SubmissionResult { requirement_id: req.id, kind: req.kind(), value })
            .collect();
        let submission = Submission {
            id: db.next_submission_id(),
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            store: store.into(),
            submitted_by: by.into(),
            date,
            status,
            results,
            feedback: feedback.map(str::to_string),
            reviewed_at_utc: status.is_terminal().then(|| day_start_utc(date)),
        };
        db.insert_submission(submission);
    }

    let now_utc = now.and_utc().timestamp();
    let notes = [
        (5 * 60, NewNotification::submission_approved(TASKS[2].name, "Store A", "SUB-001"), false),
        (60 * 60, NewNotification::task_assigned("Urgent Stock Check", &task_ids[7]), false),
        (3 * 3600, NewNotification::submission_rejected(TASKS[0].name, "Store C", "SUB-002"), false),
        (24 * 3600, NewNotification::task_overdue(TASKS[6].name, &task_ids[6]), true),
        (
            48 * 3600,
            NewNotification {
                title: "System Maintenance".into(),
                description: "Scheduled maintenance will occur tonight at 2 AM.".into(),
                link: None,
            },
            true,
        ),
    ];
    let note_count = notes.len();
    for (age_secs, note, read) in notes {
        let id = db.push_notification(note, now_utc - age_secs);
        db.notification_mut(id)?.is_read = read;
    }

    let summary = SeedSummary {
        users: db.users.len(),
        tasks: db.tasks.len(),
        submissions: db.submissions.len(),
        notifications: note_count,
    };
    info!(?summary, "demo data seeded");
    Ok(summary)
}

fn day_start_utc(date: NaiveDate) -> i64 {
    date.and_hms_opt(9, 0, 0).map_or(0, |dt| dt.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::TaskType;
    use crate::report::store_reports;
    use crate::review::ReviewQueue;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 24).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_seed_counts_and_ids() {
        let mut db = Database::default();
        let summary = seed(&mut db, now()).unwrap();
        assert_eq!(summary, SeedSummary { users: 5, tasks: 12, submissions: 10, notifications: 5 });
        assert_eq!(db.tasks.last().unwrap().id, "TSK-012");
        assert_eq!(db.submissions.last().unwrap().id, "SUB-010");
        assert_eq!(db.next_task_id(), "TSK-013");
    }

    #[test]
    fn test_seed_types_are_derived() {
        let mut db = Database::default();
        seed(&mut db, now()).unwrap();
        let types: Vec<TaskType> = db.tasks.iter().map(|t| t.task_type()).collect();
        assert_eq!(types[0], TaskType::Mixed);
        assert_eq!(types[1], TaskType::DataEntry);
        assert_eq!(types[4], TaskType::Checklist);
        assert_eq!(types[8], TaskType::Image);
        assert_eq!(types[11], TaskType::VisualStandard);
    }

    #[test]
    fn test_seed_one_live_submission_per_task() {
        let mut db = Database::default();
        seed(&mut db, now()).unwrap();
        for task in &db.tasks {
            let live = db.submissions.iter().filter(|s| s.task_id == task.id && s.is_pending()).count();
            assert!(live <= 1, "{} has {live} live submissions", task.id);
            assert_eq!(live == 1, task.status == TaskStatus::PendingReview, "{}", task.id);
        }
        assert_eq!(ReviewQueue::pending(&db).len(), 5);
    }

    #[test]
    fn test_seed_results_match_requirements() {
        let mut db = Database::default();
        seed(&mut db, now()).unwrap();
        for sub in &db.submissions {
            let task = db.task(&sub.task_id).unwrap();
            for result in &sub.results {
                let req = task.requirement(result.requirement_id).unwrap();
                assert_eq!(req.kind(), result.kind, "{}", sub.id);
            }
        }
    }

    #[test]
    fn test_seed_report_is_attributed() {
        let mut db = Database::default();
        seed(&mut db, now()).unwrap();
        let reports = store_reports(&db.tasks, &db.users);
        let names: Vec<&str> = reports.iter().map(|r| r.store_name.as_str()).collect();
        assert_eq!(names, vec!["Stores Group A", "Store C, Store D", "Store B", "Store E", "Store A"]);
        assert!(reports.iter().all(|r| r.unattributed.total == 0));
        let store_b = &reports[2];
        assert_eq!(store_b.overview.total, 7);
        assert_eq!(store_b.overview.completed, 2);
    }

    #[test]
    fn test_reseed_replaces_existing_data() {
        let mut db = Database::default();
        seed(&mut db, now()).unwrap();
        seed(&mut db, now()).unwrap();
        assert_eq!(db.tasks.len(), 12);
        assert_eq!(db.tasks[0].id, "TSK-001");
    }
}
