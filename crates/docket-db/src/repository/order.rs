//! SurrealDB implementation of [`OrderRepository`].

use chrono::{DateTime, Utc};
use docket_core::error::DocketResult;
use docket_core::models::history::CreateOrderHistory;
use docket_core::models::order::{CreateOrder, Order};
use docket_core::repository::{OrderRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::history::{HISTORY_INSERT, HistoryParams};
use super::{CountRow, parse_opt_uuid, parse_uuid, transaction};
use crate::error::DbError;

pub(crate) const SELECT_ORDER: &str = "SELECT meta::id(id) AS record_id, * FROM";

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
pub(crate) struct OrderRow {
    record_id: String,
    reference_number: String,
    title: String,
    order_type: String,
    status: String,
    priority: String,
    department_id: String,
    department_name: String,
    subject_id: Option<String>,
    subject_name: Option<String>,
    created_by: String,
    is_public: bool,
    expiration_date: Option<DateTime<Utc>>,
    is_archived: bool,
    archived_at: Option<DateTime<Utc>>,
    archived_by: Option<String>,
    archive_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub(crate) fn try_into_order(self) -> Result<Order, DbError> {
        Ok(Order {
            id: parse_uuid("orders", &self.record_id)?,
            reference_number: self.reference_number,
            title: self.title,
            order_type: self.order_type,
            status: self.status,
            priority: self.priority,
            department_id: parse_uuid("orders", &self.department_id)?,
            department_name: self.department_name,
            subject_id: parse_opt_uuid("orders", self.subject_id)?,
            subject_name: self.subject_name,
            created_by: parse_uuid("orders", &self.created_by)?,
            is_public: self.is_public,
            expiration_date: self.expiration_date,
            is_archived: self.is_archived,
            archived_at: self.archived_at,
            archived_by: parse_opt_uuid("orders", self.archived_by)?,
            archive_reason: self.archive_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fetch one order by id. Shared with the archive repository, which reads
/// the order back after a restore.
pub(crate) async fn fetch_order<C: Connection>(db: &Surreal<C>, id: Uuid) -> DocketResult<Order> {
    let id_str = id.to_string();

    let mut result = db
        .query(format!("{SELECT_ORDER} type::record('orders', $id)"))
        .bind(("id", id_str.clone()))
        .await
        .map_err(DbError::from)?;

    let rows: Vec<OrderRow> = result.take(0).map_err(DbError::from)?;
    let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
        entity: "order".into(),
        id: id_str,
    })?;

    row.try_into_order().map_err(Into::into)
}

/// SurrealDB implementation of the Order repository.
#[derive(Clone)]
pub struct SurrealOrderRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOrderRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_many(
        &self,
        filter: &str,
        from: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> DocketResult<Vec<Order>> {
        let mut builder = self
            .db
            .query(format!(
                "{SELECT_ORDER} orders WHERE is_archived = false \
                 AND expiration_date != NONE AND {filter} \
                 ORDER BY expiration_date ASC"
            ))
            .bind(("from", from));
        if let Some(until) = until {
            builder = builder.bind(("until", until));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<OrderRow> = result.take(0).map_err(DbError::from)?;

        let orders = rows
            .into_iter()
            .map(OrderRow::try_into_order)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(orders)
    }
}

impl<C: Connection> OrderRepository for SurrealOrderRepository<C> {
    async fn create(&self, input: CreateOrder) -> DocketResult<Order> {
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(
                "CREATE type::record('orders', $id) SET \
                 reference_number = $reference_number, title = $title, \
                 order_type = $order_type, status = $status, \
                 priority = $priority, \
                 department_id = $department_id, \
                 department_name = $department_name, \
                 subject_id = $subject_id, subject_name = $subject_name, \
                 created_by = $created_by, is_public = $is_public, \
                 expiration_date = $expiration_date",
            )
            .bind(("id", id.to_string()))
            .bind(("reference_number", input.reference_number))
            .bind(("title", input.title))
            .bind(("order_type", input.order_type))
            .bind(("status", input.status))
            .bind(("priority", input.priority))
            .bind(("department_id", input.department_id.to_string()))
            .bind(("department_name", input.department_name))
            .bind(("subject_id", input.subject_id.map(|s| s.to_string())))
            .bind(("subject_name", input.subject_name))
            .bind(("created_by", input.created_by.to_string()))
            .bind(("is_public", input.is_public))
            .bind(("expiration_date", input.expiration_date))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::from_statement("order", e))?;

        fetch_order(&self.db, id).await
    }

    async fn get_by_id(&self, id: Uuid) -> DocketResult<Order> {
        fetch_order(&self.db, id).await
    }

    async fn list(&self, pagination: Pagination) -> DocketResult<PaginatedResult<Order>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM orders GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "{SELECT_ORDER} orders ORDER BY created_at ASC \
                 LIMIT $limit START $offset"
            ))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrderRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(OrderRow::try_into_order)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> DocketResult<Vec<Order>> {
        self.select_many("expiration_date <= $from", now, None).await
    }

    async fn list_expiring_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DocketResult<Vec<Order>> {
        self.select_many(
            "expiration_date > $from AND expiration_date <= $until",
            from,
            Some(until),
        )
        .await
    }

    async fn set_expiration_date(
        &self,
        id: Uuid,
        expiration_date: Option<DateTime<Utc>>,
        history: CreateOrderHistory,
    ) -> DocketResult<Order> {
        let query = transaction(&format!(
            "UPDATE type::record('orders', $id) SET \
             expiration_date = $expiration_date, updated_at = time::now();\n\
             {HISTORY_INSERT}"
        ));

        let builder = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("expiration_date", expiration_date));
        let result = bind_history!(builder, HistoryParams::new(history))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::from_statement("order", e))?;

        fetch_order(&self.db, id).await
    }
}
