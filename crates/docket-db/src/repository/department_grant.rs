//! SurrealDB implementation of [`DepartmentGrantRepository`].

use chrono::{DateTime, Utc};
use docket_core::error::DocketResult;
use docket_core::models::capability::DepartmentCapabilities;
use docket_core::models::grant::{CreateDepartmentGrant, DepartmentGrant};
use docket_core::models::history::CreateOrderHistory;
use docket_core::repository::DepartmentGrantRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::history::{HISTORY_INSERT, HistoryParams};
use super::{parse_uuid, require_rows, transaction};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct DepartmentGrantRow {
    record_id: String,
    order_id: String,
    department_id: String,
    can_view: bool,
    can_edit: bool,
    can_download: bool,
    can_share: bool,
    granted_by: String,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    notes: Option<String>,
}

impl DepartmentGrantRow {
    fn try_into_grant(self) -> Result<DepartmentGrant, DbError> {
        Ok(DepartmentGrant {
            id: parse_uuid("department_grant", &self.record_id)?,
            order_id: parse_uuid("department_grant", &self.order_id)?,
            department_id: parse_uuid("department_grant", &self.department_id)?,
            capabilities: DepartmentCapabilities {
                view: self.can_view,
                edit: self.can_edit,
                download: self.can_download,
                share: self.can_share,
            },
            granted_by: parse_uuid("department_grant", &self.granted_by)?,
            granted_at: self.granted_at,
            expires_at: self.expires_at,
            notes: self.notes,
        })
    }
}

fn collect(rows: Vec<DepartmentGrantRow>) -> Result<Vec<DepartmentGrant>, DbError> {
    rows.into_iter()
        .map(DepartmentGrantRow::try_into_grant)
        .collect()
}

/// Selects the grant addressed by `$order_id` and `$department_id`.
const GRANT_FOR_PAIR: &str = "SELECT VALUE id FROM department_grant \
    WHERE order_id = $order_id AND department_id = $department_id";

/// SurrealDB implementation of the department grant store.
#[derive(Clone)]
pub struct SurrealDepartmentGrantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDepartmentGrantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn write(
        &self,
        statement: &str,
        record_id: Option<Uuid>,
        input: CreateDepartmentGrant,
        history: CreateOrderHistory,
    ) -> DocketResult<DepartmentGrant> {
        let order_id = input.order_id;
        let department_id = input.department_id;
        let caps = input.capabilities;

        let builder = self
            .db
            .query(transaction(&format!("{statement}\n{HISTORY_INSERT}")))
            .bind(("id", record_id.map(|id| id.to_string())))
            .bind(("order_id", order_id.to_string()))
            .bind(("department_id", department_id.to_string()))
            .bind(("can_view", caps.view))
            .bind(("can_edit", caps.edit))
            .bind(("can_download", caps.download))
            .bind(("can_share", caps.share))
            .bind(("granted_by", input.granted_by.to_string()))
            .bind(("expires_at", input.expires_at))
            .bind(("notes", input.notes));
        let result = bind_history!(builder, HistoryParams::new(history))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| {
                DbError::from_guarded("department_grant", format!("{order_id}/{department_id}"), e)
            })?;

        self.get(order_id, department_id)
            .await?
            .ok_or_else(|| DbError::NotFound {
                entity: "department_grant".into(),
                id: format!("{order_id}/{department_id}"),
            })
            .map_err(Into::into)
    }
}

impl<C: Connection> DepartmentGrantRepository for SurrealDepartmentGrantRepository<C> {
    async fn get(
        &self,
        order_id: Uuid,
        department_id: Uuid,
    ) -> DocketResult<Option<DepartmentGrant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM department_grant \
                 WHERE order_id = $order_id AND department_id = $department_id",
            )
            .bind(("order_id", order_id.to_string()))
            .bind(("department_id", department_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DepartmentGrantRow> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?.into_iter().next())
    }

    async fn list_by_order(&self, order_id: Uuid) -> DocketResult<Vec<DepartmentGrant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM department_grant \
                 WHERE order_id = $order_id ORDER BY granted_at ASC",
            )
            .bind(("order_id", order_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DepartmentGrantRow> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?)
    }

    async fn list_for_departments(
        &self,
        order_id: Uuid,
        department_ids: &[Uuid],
    ) -> DocketResult<Vec<DepartmentGrant>> {
        if department_ids.is_empty() {
            return Ok(Vec::new());
        }
        let department_ids: Vec<String> = department_ids.iter().map(Uuid::to_string).collect();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM department_grant \
                 WHERE order_id = $order_id \
                 AND department_id IN $department_ids",
            )
            .bind(("order_id", order_id.to_string()))
            .bind(("department_ids", department_ids))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DepartmentGrantRow> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?)
    }

    async fn create(
        &self,
        input: CreateDepartmentGrant,
        history: CreateOrderHistory,
    ) -> DocketResult<DepartmentGrant> {
        let statement = "CREATE type::record('department_grant', $id) SET \
             order_id = $order_id, department_id = $department_id, \
             can_view = $can_view, can_edit = $can_edit, \
             can_download = $can_download, can_share = $can_share, \
             granted_by = $granted_by, expires_at = $expires_at, \
             notes = $notes;";
        self.write(statement, Some(Uuid::new_v4()), input, history)
            .await
    }

    async fn replace(
        &self,
        input: CreateDepartmentGrant,
        history: CreateOrderHistory,
    ) -> DocketResult<DepartmentGrant> {
        let statement = format!(
            "{}\n\
             UPDATE department_grant SET \
             can_view = $can_view, can_edit = $can_edit, \
             can_download = $can_download, can_share = $can_share, \
             granted_by = $granted_by, granted_at = time::now(), \
             expires_at = $expires_at, notes = $notes \
             WHERE order_id = $order_id AND department_id = $department_id;",
            require_rows(GRANT_FOR_PAIR)
        );
        self.write(&statement, None, input, history).await
    }

    async fn delete(
        &self,
        order_id: Uuid,
        department_id: Uuid,
        history: CreateOrderHistory,
    ) -> DocketResult<()> {
        let query = transaction(&format!(
            "{}\n\
             DELETE department_grant WHERE order_id = $order_id \
             AND department_id = $department_id;\n{HISTORY_INSERT}",
            require_rows(GRANT_FOR_PAIR)
        ));

        let builder = self
            .db
            .query(query)
            .bind(("order_id", order_id.to_string()))
            .bind(("department_id", department_id.to_string()));
        let result = bind_history!(builder, HistoryParams::new(history))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| {
                DbError::from_guarded("department_grant", format!("{order_id}/{department_id}"), e)
            })?;

        Ok(())
    }
}
