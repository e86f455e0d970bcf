//! Activity log domain model: one append-only row per inbound request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderActivityLog {
    pub id: Uuid,
    /// `None` for requests not scoped to a single order (listings).
    pub order_id: Option<Uuid>,
    pub actor_id: Uuid,
    pub controller: String,
    pub action: String,
    pub http_method: String,
    pub path: String,
    pub is_success: bool,
    pub status_code: u16,
    pub error_message: Option<String>,
    pub payload: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateActivityLog {
    pub order_id: Option<Uuid>,
    pub actor_id: Uuid,
    pub controller: String,
    pub action: String,
    pub http_method: String,
    pub path: String,
    pub is_success: bool,
    pub status_code: u16,
    pub error_message: Option<String>,
    pub payload: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
