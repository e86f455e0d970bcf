//! Attachment metadata. File bytes live in an external store; only the
//! summary is read at archive time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub id: Uuid,
    pub order_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAttachment {
    pub order_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}
