//! Archive snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::grant::OrderGrants;
use super::history::CreateOrderHistory;
use super::order::Order;

/// Point-in-time copy of an order taken when it is archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedOrder {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reference_number: String,
    pub title: String,
    pub order_type: String,
    pub status: String,
    pub priority: String,
    pub department_id: Uuid,
    pub department_name: String,
    pub subject_id: Option<Uuid>,
    pub subject_name: Option<String>,
    /// Owner of the archived order.
    pub created_by: Uuid,
    pub order_created_at: DateTime<Utc>,
    pub order_updated_at: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub archived_by: Uuid,
    pub archived_at: DateTime<Utc>,
    pub archive_reason: String,
    /// JSON of [`OrderGraph`].
    pub serialized_order_data: String,
    /// JSON array of attachment summaries.
    pub attachments_info: String,
    /// Hex SHA-256 of `serialized_order_data`.
    pub payload_digest: String,
    pub can_be_restored: bool,
}

/// The full order graph captured in `serialized_order_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderGraph {
    pub order: Order,
    pub grants: OrderGrants,
}

/// Snapshot plus the atomic side effects of archiving one order.
#[derive(Debug, Clone)]
pub struct ArchiveOrder {
    /// Caller-assigned snapshot id.
    pub snapshot_id: Uuid,
    pub order: Order,
    pub archived_by: Uuid,
    pub archived_at: DateTime<Utc>,
    pub archive_reason: String,
    pub serialized_order_data: String,
    pub attachments_info: String,
    pub payload_digest: String,
    /// Grants captured in the snapshot. The live grant rows must still be
    /// exactly these when the archive is written.
    pub grants: OrderGrants,
    pub history: CreateOrderHistory,
}

/// Side effects of restoring a snapshot.
#[derive(Debug, Clone)]
pub struct RestoreOrder {
    pub archived_order_id: Uuid,
    pub order_id: Uuid,
    /// Grants to re-create on the live order; empty when the archive
    /// policy discards them.
    pub grants: OrderGrants,
    pub history: CreateOrderHistory,
}

/// Filters for listing snapshots.
#[derive(Debug, Clone, Default)]
pub struct ArchivedOrderFilter {
    /// Only snapshots of orders owned by this user.
    pub owner_id: Option<Uuid>,
}
