//! # ConnectFlow
//!
//! Task lifecycle for retail field operations. Head office creates tasks with
//! typed requirements (photos, checklists, data entry, visual standards),
//! stores submit results, reviewers approve or reject them, and completion is
//! reported per store and department.
//!
//! All reads and writes go through [`db::Repository`]; [`db::Database`] is the
//! JSON-file backed implementation used by the `cf` binary.

pub mod cli;
pub mod cmd;
pub mod config;
pub mod db;
pub mod error;
pub mod factory;
pub mod fields;
pub mod intake;
pub mod notify;
pub mod report;
pub mod review;
pub mod seed;
pub mod submission;
pub mod task;
pub mod user;
pub mod validation;

pub use error::{Error, Result};
