//! Request activity logging.
//!
//! [`ActivityLogger::track`] wraps one service call and appends exactly
//! one activity row describing it, whether the call succeeded or not.

use docket_core::context::RequestContext;
use docket_core::error::DocketResult;
use docket_core::models::activity::{CreateActivityLog, OrderActivityLog};
use docket_core::repository::{
    ActivityLogFilter, ActivityLogRepository, PaginatedResult, Pagination,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AccessConfig;

/// Transport-level description of the request being tracked.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub controller: String,
    pub action: String,
    pub http_method: String,
    pub path: String,
    /// `None` for requests not scoped to one order.
    pub order_id: Option<Uuid>,
    pub payload: serde_json::Value,
}

impl RequestInfo {
    pub fn new(
        controller: impl Into<String>,
        action: impl Into<String>,
        http_method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            http_method: http_method.into(),
            path: path.into(),
            order_id: None,
            payload: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn for_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

pub struct ActivityLogger<L> {
    log: L,
    config: AccessConfig,
}

impl<L: ActivityLogRepository> ActivityLogger<L> {
    pub fn new(log: L, config: AccessConfig) -> Self {
        Self { log, config }
    }

    /// Await `operation` and record its outcome. Failing to write the
    /// activity row never changes the returned result.
    pub async fn track<T, F>(
        &self,
        ctx: &RequestContext,
        request: RequestInfo,
        operation: F,
    ) -> DocketResult<T>
    where
        F: Future<Output = DocketResult<T>>,
    {
        let result = operation.await;

        let (is_success, status_code, error_message) = match &result {
            Ok(_) => (true, 200, None),
            Err(err) => (false, err.status_code(), Some(err.to_string())),
        };

        let entry = CreateActivityLog {
            order_id: request.order_id,
            actor_id: ctx.actor_id,
            controller: request.controller,
            action: request.action,
            http_method: request.http_method,
            path: request.path,
            is_success,
            status_code,
            error_message,
            payload: request.payload,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        };
        let action = entry.action.clone();

        match self.log.append(entry).await {
            Ok(row) => debug!(
                activity_id = %row.id,
                action = %action,
                is_success,
                status_code,
                "Activity recorded"
            ),
            Err(err) => warn!(
                action = %action,
                actor_id = %ctx.actor_id,
                error = %err,
                "Failed to record activity"
            ),
        }

        result
    }

    /// Activity rows matching `filter`, newest first.
    pub async fn list(
        &self,
        filter: ActivityLogFilter,
        pagination: Pagination,
    ) -> DocketResult<PaginatedResult<OrderActivityLog>> {
        self.log.list(filter, self.config.page(pagination)).await
    }
}
