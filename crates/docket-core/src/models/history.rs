//! Order history: append-only, domain-event-centric audit rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    PermissionGranted,
    PermissionUpdated,
    PermissionRevoked,
    DepartmentAccessGranted,
    DepartmentAccessUpdated,
    DepartmentAccessRevoked,
    ExceptionAdded,
    ExceptionRemoved,
    ExpirationSet,
    ExpirationRemoved,
    Archived,
    Restored,
    PermanentlyDeleted,
}

impl HistoryAction {
    pub const ALL: [Self; 13] = [
        Self::PermissionGranted,
        Self::PermissionUpdated,
        Self::PermissionRevoked,
        Self::DepartmentAccessGranted,
        Self::DepartmentAccessUpdated,
        Self::DepartmentAccessRevoked,
        Self::ExceptionAdded,
        Self::ExceptionRemoved,
        Self::ExpirationSet,
        Self::ExpirationRemoved,
        Self::Archived,
        Self::Restored,
        Self::PermanentlyDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionGranted => "PermissionGranted",
            Self::PermissionUpdated => "PermissionUpdated",
            Self::PermissionRevoked => "PermissionRevoked",
            Self::DepartmentAccessGranted => "DepartmentAccessGranted",
            Self::DepartmentAccessUpdated => "DepartmentAccessUpdated",
            Self::DepartmentAccessRevoked => "DepartmentAccessRevoked",
            Self::ExceptionAdded => "ExceptionAdded",
            Self::ExceptionRemoved => "ExceptionRemoved",
            Self::ExpirationSet => "ExpirationSet",
            Self::ExpirationRemoved => "ExpirationRemoved",
            Self::Archived => "Archived",
            Self::Restored => "Restored",
            Self::PermanentlyDeleted => "PermanentlyDeleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub action: HistoryAction,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub description: String,
    pub performed_by: Uuid,
    pub performed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub notes: Option<String>,
}

/// A history row to be written in the same transaction as the mutation
/// it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderHistory {
    pub order_id: Uuid,
    pub action: HistoryAction,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub description: String,
    pub performed_by: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub notes: Option<String>,
}
