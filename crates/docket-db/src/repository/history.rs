//! SurrealDB implementation of [`HistoryRepository`], plus the shared
//! statement every audited mutation appends to its transaction.

use chrono::{DateTime, Utc};
use docket_core::error::DocketResult;
use docket_core::models::history::{CreateOrderHistory, HistoryAction, OrderHistory};
use docket_core::repository::{HistoryRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, parse_uuid};
use crate::error::DbError;

/// Appends one history row. Expects the `$h_*` bindings produced by
/// `bind_history!`.
pub(crate) const HISTORY_INSERT: &str = "\
CREATE type::record('order_history', $h_id) SET \
    order_id = $h_order_id, \
    action = $h_action, \
    old_value = $h_old_value, \
    new_value = $h_new_value, \
    description = $h_description, \
    performed_by = $h_performed_by, \
    performed_at = time::now(), \
    ip_address = $h_ip_address, \
    user_agent = $h_user_agent, \
    notes = $h_notes;";

/// Bindable form of [`CreateOrderHistory`]. Snapshots are stored as
/// JSON text.
pub(crate) struct HistoryParams {
    pub(crate) id: String,
    pub(crate) order_id: String,
    pub(crate) action: String,
    pub(crate) old_value: Option<String>,
    pub(crate) new_value: Option<String>,
    pub(crate) description: String,
    pub(crate) performed_by: String,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) notes: Option<String>,
}

impl HistoryParams {
    pub(crate) fn new(input: CreateOrderHistory) -> Self {
        Self {
            // v7 ids keep rows with equal timestamps in insertion order.
            id: Uuid::now_v7().to_string(),
            order_id: input.order_id.to_string(),
            action: input.action.as_str().to_string(),
            old_value: input.old_value.map(|v| v.to_string()),
            new_value: input.new_value.map(|v| v.to_string()),
            description: input.description,
            performed_by: input.performed_by.to_string(),
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            notes: input.notes,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct HistoryRow {
    record_id: String,
    order_id: String,
    action: String,
    old_value: Option<String>,
    new_value: Option<String>,
    description: String,
    performed_by: String,
    performed_at: DateTime<Utc>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    notes: Option<String>,
}

fn parse_snapshot(raw: Option<String>) -> Result<Option<serde_json::Value>, DbError> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DbError::corrupt("order_history", format!("invalid snapshot JSON: {e}")))
}

impl HistoryRow {
    fn try_into_history(self) -> Result<OrderHistory, DbError> {
        let action = HistoryAction::parse(&self.action).ok_or_else(|| {
            DbError::corrupt("order_history", format!("unknown action {}", self.action))
        })?;
        Ok(OrderHistory {
            id: parse_uuid("order_history", &self.record_id)?,
            order_id: parse_uuid("order_history", &self.order_id)?,
            action,
            old_value: parse_snapshot(self.old_value)?,
            new_value: parse_snapshot(self.new_value)?,
            description: self.description,
            performed_by: parse_uuid("order_history", &self.performed_by)?,
            performed_at: self.performed_at,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            notes: self.notes,
        })
    }
}

/// SurrealDB implementation of the History repository.
#[derive(Clone)]
pub struct SurrealHistoryRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealHistoryRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> HistoryRepository for SurrealHistoryRepository<C> {
    async fn list_by_order(
        &self,
        order_id: Uuid,
        pagination: Pagination,
    ) -> DocketResult<PaginatedResult<OrderHistory>> {
        let order_id_str = order_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM order_history \
                 WHERE order_id = $order_id GROUP ALL",
            )
            .bind(("order_id", order_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM order_history \
                 WHERE order_id = $order_id \
                 ORDER BY performed_at DESC, record_id DESC \
                 LIMIT $limit START $offset",
            )
            .bind(("order_id", order_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<HistoryRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(HistoryRow::try_into_history)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
