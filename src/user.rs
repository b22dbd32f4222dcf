//! Users, used to attribute tasks to departments for reporting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::fields::{Department, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Department,
    #[serde(default)]
    pub avatar_id: String,
}

/// Lookup of users by id.
pub fn user_map(users: &[User]) -> HashMap<&str, &User> {
    users.iter().map(|u| (u.id.as_str(), u)).collect()
}
