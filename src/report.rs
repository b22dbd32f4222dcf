//! Completion reporting per store and department.
//!
//! Everything here is a pure function of the task and user collections.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::fields::{Department, TaskStatus};
use crate::task::{Assignee, Task};
use crate::user::{user_map, User};

/// Task counts for one slice of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DepartmentStats {
    pub total: u32,
    pub completed: u32,
}

impl DepartmentStats {
    fn count(&mut self, task: &Task) {
        self.total += 1;
        if task.status.is_complete() {
            self.completed += 1;
        }
    }

    /// Rounded completion percentage, or `None` when there is nothing to complete.
    pub fn percentage(&self) -> Option<u32> {
        if self.total == 0 {
            return None;
        }
        Some((f64::from(self.completed) * 100.0 / f64::from(self.total)).round() as u32)
    }
}

/// Completion of the tasks that apply to one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreReport {
    pub store_code: String,
    pub store_name: String,
    pub overview: DepartmentStats,
    /// Every department, including those with no tasks.
    pub departments: BTreeMap<Department, DepartmentStats>,
    /// Tasks whose assigning user is unknown; counted in the overview only.
    pub unattributed: DepartmentStats,
}

/// Distinct store names across tasks, in order of first appearance.
pub fn store_names(tasks: &[Task]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for task in tasks {
        if let Assignee::Named(name) = &task.store {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

/// One report row per store.
pub fn store_reports(tasks: &[Task], users: &[User]) -> Vec<StoreReport> {
    let users = user_map(users);
    store_names(tasks)
        .into_iter()
        .enumerate()
        .map(|(i, name)| store_report(format!("ST-{:03}", i + 1), name, tasks, &users))
        .collect()
}

fn store_report(code: String, name: String, tasks: &[Task], users: &HashMap<&str, &User>) -> StoreReport {
    let mut report = StoreReport {
        store_code: code,
        overview: DepartmentStats::default(),
        departments: Department::ALL.iter().map(|d| (*d, DepartmentStats::default())).collect(),
        unattributed: DepartmentStats::default(),
        store_name: name,
    };
    for task in tasks.iter().filter(|t| t.store.applies_to(&report.store_name)) {
        report.overview.count(task);
        let department = task.assigned_by.as_deref().and_then(|id| users.get(id)).map(|u| u.department);
        match department {
            Some(d) => report.departments.entry(d).or_default().count(task),
            None => report.unattributed.count(task),
        }
    }
    report
}

/// Presentation band for a completion percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionBand {
    Critical,
    Warning,
    Normal,
}

impl fmt::Display for CompletionBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompletionBand::Critical => "critical",
            CompletionBand::Warning => "warning",
            CompletionBand::Normal => "normal",
        })
    }
}

/// Band boundaries, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warn_below: u32,
    pub good_at: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { warn_below: 40, good_at: 90 }
    }
}

impl Thresholds {
    pub fn band(&self, percentage: u32) -> CompletionBand {
        if percentage < self.warn_below {
            CompletionBand::Critical
        } else if percentage < self.good_at {
            CompletionBand::Warning
        } else {
            CompletionBand::Normal
        }
    }
}

/// Task counts by status, ignoring drafts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total: u32,
    pub active: u32,
    pub pending_review: u32,
    pub completed: u32,
    pub rejected: u32,
    pub overdue: u32,
}

pub fn status_summary(tasks: &[Task]) -> StatusSummary {
    let mut summary = StatusSummary::default();
    for task in tasks {
        let slot = match task.status {
            TaskStatus::Draft => continue,
            TaskStatus::Active => &mut summary.active,
            TaskStatus::PendingReview => &mut summary.pending_review,
            TaskStatus::Completed => &mut summary.completed,
            TaskStatus::Rejected => &mut summary.rejected,
            TaskStatus::Overdue => &mut summary.overdue,
        };
        *slot += 1;
        summary.total += 1;
    }
    summary
}

/// Render store reports as CSV: one row per store, three columns per slice.
pub fn to_csv(reports: &[StoreReport]) -> String {
    let mut header = vec!["Store Code".to_string(), "Store Name".to_string()];
    let slices = std::iter::once("Overview".to_string()).chain(Department::ALL.iter().map(|d| d.to_string()));
    for slice in slices {
        header.extend(["Total", "Completed", "%"].map(|col| format!("{slice} {col}")));
    }

    let mut out = csv_line(&header);
    for report in reports {
        let mut row = vec![report.store_code.clone(), report.store_name.clone()];
        let stats = std::iter::once(report.overview).chain(Department::ALL.iter().map(|d| {
            report.departments.get(d).copied().unwrap_or_default()
        }));
        for s in stats {
            row.push(s.total.to_string());
            row.push(s.completed.to_string());
            row.push(s.percentage().map(|p| p.to_string()).unwrap_or_default());
        }
        out.push_str(&csv_line(&row));
    }
    out
}

fn csv_line(fields: &[String]) -> String {
    let quoted: Vec<String> = fields
        .iter()
        .map(|f| {
            if f.contains([',', '"', '\n']) {
                format!("\"{}\"", f.replace('"', "\"\""))
            } else {
                f.clone()
            }
        })
        .collect();
    format!("{}\n", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Role;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn user(id: &str, department: Department) -> User {
        User {
            id: id.into(),
            name: format!("User {id}"),
            email: format!("{id}@example.com"),
            role: Role::Manager,
            department,
            avatar_id: String::new(),
        }
    }

    fn task(n: usize, store: &str, status: TaskStatus, assigned_by: Option<&str>) -> Task {
        let due = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap().and_hms_opt(23, 59, 0).unwrap();
        let mut t = Task::new(format!("TSK-{n:03}"), format!("Task {n}"), Assignee::from(store.to_string()), due, 0);
        t.status = status;
        t.assigned_by = assigned_by.map(str::to_string);
        t
    }

    #[test]
    fn test_store_with_all_stores_task() {
        let users = vec![user("user-1", Department::Planning)];
        let tasks = vec![
            task(1, "Store A", TaskStatus::Completed, Some("user-1")),
            task(2, "All Stores", TaskStatus::Active, Some("user-1")),
        ];
        let reports = store_reports(&tasks, &users);
        assert_eq!(reports.len(), 1);
        let a = &reports[0];
        assert_eq!(a.store_code, "ST-001");
        assert_eq!(a.store_name, "Store A");
        assert_eq!(a.overview, DepartmentStats { total: 2, completed: 1 });
        assert_eq!(a.overview.percentage(), Some(50));
        assert_eq!(a.departments[&Department::Planning].total, 2);
        assert_eq!(a.departments[&Department::Admin].percentage(), None);
    }

    #[test]
    fn test_unknown_assigner_is_unattributed() {
        let users = vec![user("user-1", Department::Admin)];
        let tasks = vec![
            task(1, "Store B", TaskStatus::Completed, Some("user-9")),
            task(2, "Store B", TaskStatus::Active, None),
            task(3, "Store B", TaskStatus::Completed, Some("user-1")),
        ];
        let b = &store_reports(&tasks, &users)[0];
        assert_eq!(b.overview, DepartmentStats { total: 3, completed: 2 });
        assert_eq!(b.unattributed, DepartmentStats { total: 2, completed: 1 });
        assert_eq!(b.departments[&Department::Admin], DepartmentStats { total: 1, completed: 1 });
    }

    #[test]
    fn test_store_order_and_groups() {
        let tasks = vec![
            task(1, "Store B", TaskStatus::Active, None),
            task(2, "All Stores", TaskStatus::Active, None),
            task(3, "Stores Group A", TaskStatus::Active, None),
            task(4, "Store B", TaskStatus::Active, None),
        ];
        assert_eq!(store_names(&tasks), vec!["Store B", "Stores Group A"]);
    }

    #[test]
    fn test_bands() {
        let t = Thresholds::default();
        assert_eq!(t.band(0), CompletionBand::Critical);
        assert_eq!(t.band(39), CompletionBand::Critical);
        assert_eq!(t.band(40), CompletionBand::Warning);
        assert_eq!(t.band(89), CompletionBand::Warning);
        assert_eq!(t.band(90), CompletionBand::Normal);
        assert_eq!(DepartmentStats { total: 3, completed: 2 }.percentage(), Some(67));
    }

    #[test]
    fn test_status_summary_skips_drafts() {
        let tasks = vec![
            task(1, "Store A", TaskStatus::Draft, None),
            task(2, "Store A", TaskStatus::Active, None),
            task(3, "Store A", TaskStatus::Overdue, None),
            task(4, "Store A", TaskStatus::Completed, None),
        ];
        let s = status_summary(&tasks);
        assert_eq!(s.total, 3);
        assert_eq!((s.active, s.overdue, s.completed, s.pending_review), (1, 1, 1, 0));
    }

    #[test]
    fn test_csv_quotes_and_blanks() {
        let tasks = vec![task(1, "Store A, North", TaskStatus::Active, None)];
        let csv = to_csv(&store_reports(&tasks, &[]));
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0].starts_with("Store Code,Store Name,Overview Total,Overview Completed,Overview %,ADMIN Total"));
        assert!(lines[1].starts_with("ST-001,\"Store A, North\",1,0,0,0,0,,"));
    }

    fn arb_task() -> impl Strategy<Value = (usize, bool, Option<usize>)> {
        (0..4usize, any::<bool>(), proptest::option::of(0..4usize))
    }

    proptest! {
        #[test]
        fn prop_aggregation_invariants(specs in proptest::collection::vec(arb_task(), 0..40)) {
            let stores = ["Store A", "Store B", "Store C", "All Stores"];
            let depts = Department::ALL;
            let users: Vec<User> = (0..3).map(|i| user(&format!("user-{i}"), depts[i])).collect();
            let tasks: Vec<Task> = specs
                .iter()
                .enumerate()
                .map(|(n, (store, done, by))| {
                    let status = if *done { TaskStatus::Completed } else { TaskStatus::Active };
                    let by = by.map(|u| format!("user-{u}"));
                    task(n, stores[*store], status, by.as_deref())
                })
                .collect();

            let first = store_reports(&tasks, &users);
            prop_assert_eq!(&first, &store_reports(&tasks, &users));
            for report in &first {
                prop_assert!(report.overview.completed <= report.overview.total);
                let dept_total: u32 = report.departments.values().map(|d| d.total).sum();
                prop_assert_eq!(dept_total + report.unattributed.total, report.overview.total);
                if report.unattributed.total == 0 {
                    prop_assert_eq!(dept_total, report.overview.total);
                }
            }
        }
    }
}
