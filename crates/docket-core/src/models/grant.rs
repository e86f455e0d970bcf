//! Authorization facts: direct user grants, department grants and
//! per-user exceptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::capability::{Capabilities, DepartmentCapabilities};

/// Direct permission grant to one user on one order.
///
/// At most one per (order, user). A grant past `expires_at` is treated as
/// absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserGrant {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub capabilities: Capabilities,
    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl UserGrant {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Used for both creating a grant and replacing its capability set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserGrant {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub capabilities: Capabilities,
    pub granted_by: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Permission grant to every member of a department. At most one per
/// (order, department).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentGrant {
    pub id: Uuid,
    pub order_id: Uuid,
    pub department_id: Uuid,
    pub capabilities: DepartmentCapabilities,
    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl DepartmentGrant {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDepartmentGrant {
    pub order_id: Uuid,
    pub department_id: Uuid,
    pub capabilities: DepartmentCapabilities,
    pub granted_by: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Explicit revocation of department-derived access for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserException {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub reason: Option<String>,
}

impl UserException {
    /// Inactive when flagged off or past its expiry.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserException {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub created_by: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Every grant fact recorded against one order.
///
/// This is what travels inside an archive snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderGrants {
    pub user_grants: Vec<UserGrant>,
    pub department_grants: Vec<DepartmentGrant>,
    pub user_exceptions: Vec<UserException>,
}

impl OrderGrants {
    pub fn is_empty(&self) -> bool {
        self.user_grants.is_empty()
            && self.department_grants.is_empty()
            && self.user_exceptions.is_empty()
    }
}
