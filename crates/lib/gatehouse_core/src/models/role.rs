//! Role domain model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title of the built-in administrator role.
pub const ADMIN_ROLE: &str = "admin";

/// A named role. Titles are unique across all roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub title: String,
}
