//! SurrealDB implementation of [`ActivityLogRepository`].

use chrono::{DateTime, Utc};
use docket_core::error::DocketResult;
use docket_core::models::activity::{CreateActivityLog, OrderActivityLog};
use docket_core::repository::{
    ActivityLogFilter, ActivityLogRepository, PaginatedResult, Pagination,
};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ActivityRow {
    record_id: String,
    order_id: Option<String>,
    actor_id: String,
    controller: String,
    action: String,
    http_method: String,
    path: String,
    is_success: bool,
    status_code: u32,
    error_message: Option<String>,
    payload: serde_json::Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ActivityRow {
    fn try_into_log(self) -> Result<OrderActivityLog, DbError> {
        let status_code = u16::try_from(self.status_code).map_err(|_| {
            DbError::corrupt(
                "order_activity",
                format!("status code {} out of range", self.status_code),
            )
        })?;
        Ok(OrderActivityLog {
            id: parse_uuid("order_activity", &self.record_id)?,
            order_id: parse_opt_uuid("order_activity", self.order_id)?,
            actor_id: parse_uuid("order_activity", &self.actor_id)?,
            controller: self.controller,
            action: self.action,
            http_method: self.http_method,
            path: self.path,
            is_success: self.is_success,
            status_code,
            error_message: self.error_message,
            payload: self.payload,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            timestamp: self.timestamp,
        })
    }
}

/// The `payload` column only holds objects. Anything else is wrapped.
fn object_payload(payload: serde_json::Value) -> serde_json::Value {
    match payload {
        serde_json::Value::Object(_) => payload,
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => serde_json::json!({ "value": other }),
    }
}

/// Build the `WHERE` clause for the set filters.
fn where_clause(filter: &ActivityLogFilter) -> String {
    let mut conditions = Vec::new();
    if filter.order_id.is_some() {
        conditions.push("order_id = $order_id");
    }
    if filter.actor_id.is_some() {
        conditions.push("actor_id = $actor_id");
    }
    if filter.is_success.is_some() {
        conditions.push("is_success = $is_success");
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// SurrealDB implementation of the activity log.
#[derive(Clone)]
pub struct SurrealActivityLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealActivityLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ActivityLogRepository for SurrealActivityLogRepository<C> {
    async fn append(&self, input: CreateActivityLog) -> DocketResult<OrderActivityLog> {
        let id = Uuid::now_v7();

        let mut result = self
            .db
            .query(
                "CREATE type::record('order_activity', $id) SET \
                 order_id = $order_id, actor_id = $actor_id, \
                 controller = $controller, action = $action, \
                 http_method = $http_method, path = $path, \
                 is_success = $is_success, status_code = $status_code, \
                 error_message = $error_message, payload = $payload, \
                 ip_address = $ip_address, user_agent = $user_agent, \
                 timestamp = time::now(); \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('order_activity', $id);",
            )
            .bind(("id", id.to_string()))
            .bind(("order_id", input.order_id.map(|o| o.to_string())))
            .bind(("actor_id", input.actor_id.to_string()))
            .bind(("controller", input.controller))
            .bind(("action", input.action))
            .bind(("http_method", input.http_method))
            .bind(("path", input.path))
            .bind(("is_success", input.is_success))
            .bind(("status_code", u32::from(input.status_code)))
            .bind(("error_message", input.error_message))
            .bind(("payload", object_payload(input.payload)))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ActivityRow> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            DbError::Query("activity log insert returned no record".into())
        })?;

        row.try_into_log().map_err(Into::into)
    }

    async fn list(
        &self,
        filter: ActivityLogFilter,
        pagination: Pagination,
    ) -> DocketResult<PaginatedResult<OrderActivityLog>> {
        let clause = where_clause(&filter);

        let mut builder = self
            .db
            .query(format!(
                "SELECT count() AS total FROM order_activity{clause} GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM order_activity{clause} \
                 ORDER BY timestamp DESC, record_id DESC \
                 LIMIT $limit START $offset;"
            ))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(order_id) = filter.order_id {
            builder = builder.bind(("order_id", order_id.to_string()));
        }
        if let Some(actor_id) = filter.actor_id {
            builder = builder.bind(("actor_id", actor_id.to_string()));
        }
        if let Some(is_success) = filter.is_success {
            builder = builder.bind(("is_success", is_success));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let rows: Vec<ActivityRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ActivityRow::try_into_log)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
