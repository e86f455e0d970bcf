//! SurrealDB implementation of [`ArchiveRepository`].
//!
//! Archive, restore and purge each run as one SurrealQL transaction: the
//! snapshot row, the flag on the live order, the grant rows and the
//! history row change together or not at all.

use chrono::{DateTime, Utc};
use docket_core::error::DocketResult;
use docket_core::models::archive::{
    ArchiveOrder, ArchivedOrder, ArchivedOrderFilter, RestoreOrder,
};
use docket_core::models::history::CreateOrderHistory;
use docket_core::models::order::Order;
use docket_core::repository::{ArchiveRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::history::{HISTORY_INSERT, HistoryParams};
use super::order::fetch_order;
use super::{CountRow, DUPLICATE_ROW, STALE_GRANTS, parse_opt_uuid, parse_uuid, require_rows, transaction};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ArchivedOrderRow {
    record_id: String,
    order_id: String,
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
    order_created_at: DateTime<Utc>,
    order_updated_at: DateTime<Utc>,
    expiration_date: Option<DateTime<Utc>>,
    archived_by: String,
    archived_at: DateTime<Utc>,
    archive_reason: String,
    serialized_order_data: String,
    attachments_info: String,
    payload_digest: String,
    can_be_restored: bool,
}

impl ArchivedOrderRow {
    fn try_into_archived(self) -> Result<ArchivedOrder, DbError> {
        Ok(ArchivedOrder {
            id: parse_uuid("archived_order", &self.record_id)?,
            order_id: parse_uuid("archived_order", &self.order_id)?,
            reference_number: self.reference_number,
            title: self.title,
            order_type: self.order_type,
            status: self.status,
            priority: self.priority,
            department_id: parse_uuid("archived_order", &self.department_id)?,
            department_name: self.department_name,
            subject_id: parse_opt_uuid("archived_order", self.subject_id)?,
            subject_name: self.subject_name,
            created_by: parse_uuid("archived_order", &self.created_by)?,
            order_created_at: self.order_created_at,
            order_updated_at: self.order_updated_at,
            expiration_date: self.expiration_date,
            archived_by: parse_uuid("archived_order", &self.archived_by)?,
            archived_at: self.archived_at,
            archive_reason: self.archive_reason,
            serialized_order_data: self.serialized_order_data,
            attachments_info: self.attachments_info,
            payload_digest: self.payload_digest,
            can_be_restored: self.can_be_restored,
        })
    }
}

/// First statement of the archive transaction. Cancels it when the order
/// already has a snapshot (or the snapshot id is taken), or when the live
/// grant rows differ from the ids captured in the snapshot.
fn archive_guard() -> String {
    format!(
        "IF array::len((SELECT VALUE id FROM archived_order \
             WHERE order_id = $order_id \
             OR id = type::record('archived_order', $id))) > 0 \
         {{ THROW \"{DUPLICATE_ROW}\" }} \
         ELSE IF array::sort((SELECT VALUE meta::id(id) FROM user_grant \
             WHERE order_id = $order_id)) != array::sort($user_grant_ids) \
         OR array::sort((SELECT VALUE meta::id(id) FROM department_grant \
             WHERE order_id = $order_id)) != array::sort($department_grant_ids) \
         OR array::sort((SELECT VALUE meta::id(id) FROM user_exception \
             WHERE order_id = $order_id)) != array::sort($user_exception_ids) \
         {{ THROW \"{STALE_GRANTS}\" }};"
    )
}

fn id_strings(ids: impl Iterator<Item = Uuid>) -> Vec<String> {
    ids.map(|id| id.to_string()).collect()
}

const ARCHIVE_STATEMENTS: &str = "\
CREATE type::record('archived_order', $id) SET \
    order_id = $order_id, \
    reference_number = $reference_number, title = $title, \
    order_type = $order_type, status = $status, priority = $priority, \
    department_id = $department_id, department_name = $department_name, \
    subject_id = $subject_id, subject_name = $subject_name, \
    created_by = $created_by, \
    order_created_at = $order_created_at, \
    order_updated_at = $order_updated_at, \
    expiration_date = $expiration_date, \
    archived_by = $archived_by, archived_at = $archived_at, \
    archive_reason = $archive_reason, \
    serialized_order_data = $serialized_order_data, \
    attachments_info = $attachments_info, \
    payload_digest = $payload_digest, \
    can_be_restored = true;
UPDATE type::record('orders', $order_id) SET \
    is_archived = true, archived_at = $archived_at, \
    archived_by = $archived_by, archive_reason = $archive_reason;
DELETE user_grant WHERE order_id = $order_id;
DELETE department_grant WHERE order_id = $order_id;
DELETE user_exception WHERE order_id = $order_id;";

const UNFLAG_ORDER: &str = "\
UPDATE type::record('orders', $order_id) SET \
    is_archived = false, archived_at = NONE, archived_by = NONE, \
    archive_reason = NONE;";

const SNAPSHOT_BY_ID: &str = "SELECT VALUE id FROM type::record('archived_order', $archived_id)";

/// Statements re-creating the captured grants. Bind keys are numbered per
/// row and match the binds applied in [`SurrealArchiveRepository::restore`].
fn restore_grant_statements(input: &RestoreOrder) -> String {
    let mut sql = String::new();
    for i in 0..input.grants.user_grants.len() {
        sql.push_str(&format!(
            "CREATE type::record('user_grant', $ug{i}_id) SET \
             order_id = $order_id, user_id = $ug{i}_user_id, \
             can_view = $ug{i}_can_view, can_edit = $ug{i}_can_edit, \
             can_delete = $ug{i}_can_delete, can_share = $ug{i}_can_share, \
             can_download = $ug{i}_can_download, \
             can_print = $ug{i}_can_print, \
             can_comment = $ug{i}_can_comment, \
             can_approve = $ug{i}_can_approve, \
             granted_by = $ug{i}_granted_by, \
             granted_at = $ug{i}_granted_at, \
             expires_at = $ug{i}_expires_at, notes = $ug{i}_notes;\n"
        ));
    }
    for i in 0..input.grants.department_grants.len() {
        sql.push_str(&format!(
            "CREATE type::record('department_grant', $dg{i}_id) SET \
             order_id = $order_id, department_id = $dg{i}_department_id, \
             can_view = $dg{i}_can_view, can_edit = $dg{i}_can_edit, \
             can_download = $dg{i}_can_download, \
             can_share = $dg{i}_can_share, \
             granted_by = $dg{i}_granted_by, \
             granted_at = $dg{i}_granted_at, \
             expires_at = $dg{i}_expires_at, notes = $dg{i}_notes;\n"
        ));
    }
    for i in 0..input.grants.user_exceptions.len() {
        sql.push_str(&format!(
            "CREATE type::record('user_exception', $ue{i}_id) SET \
             order_id = $order_id, user_id = $ue{i}_user_id, \
             created_by = $ue{i}_created_by, \
             created_at = $ue{i}_created_at, \
             expires_at = $ue{i}_expires_at, \
             is_active = $ue{i}_is_active, reason = $ue{i}_reason;\n"
        ));
    }
    sql
}

/// SurrealDB implementation of the archive store.
#[derive(Clone)]
pub struct SurrealArchiveRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealArchiveRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ArchiveRepository for SurrealArchiveRepository<C> {
    async fn archive(&self, input: ArchiveOrder) -> DocketResult<ArchivedOrder> {
        let snapshot_id = input.snapshot_id;
        let order: Order = input.order;
        let grants = input.grants;

        let builder = self
            .db
            .query(transaction(&format!(
                "{}\n{ARCHIVE_STATEMENTS}\n{HISTORY_INSERT}",
                archive_guard()
            )))
            .bind((
                "user_grant_ids",
                id_strings(grants.user_grants.iter().map(|g| g.id)),
            ))
            .bind((
                "department_grant_ids",
                id_strings(grants.department_grants.iter().map(|g| g.id)),
            ))
            .bind((
                "user_exception_ids",
                id_strings(grants.user_exceptions.iter().map(|e| e.id)),
            ))
            .bind(("id", snapshot_id.to_string()))
            .bind(("order_id", order.id.to_string()))
            .bind(("reference_number", order.reference_number))
            .bind(("title", order.title))
            .bind(("order_type", order.order_type))
            .bind(("status", order.status))
            .bind(("priority", order.priority))
            .bind(("department_id", order.department_id.to_string()))
            .bind(("department_name", order.department_name))
            .bind(("subject_id", order.subject_id.map(|s| s.to_string())))
            .bind(("subject_name", order.subject_name))
            .bind(("created_by", order.created_by.to_string()))
            .bind(("order_created_at", order.created_at))
            .bind(("order_updated_at", order.updated_at))
            .bind(("expiration_date", order.expiration_date))
            .bind(("archived_by", input.archived_by.to_string()))
            .bind(("archived_at", input.archived_at))
            .bind(("archive_reason", input.archive_reason))
            .bind(("serialized_order_data", input.serialized_order_data))
            .bind(("attachments_info", input.attachments_info))
            .bind(("payload_digest", input.payload_digest));
        let result = bind_history!(builder, HistoryParams::new(input.history))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::from_guarded("archived_order", order.id, e))?;

        debug!(order_id = %order.id, snapshot_id = %snapshot_id, "Archive transaction committed");
        self.get_by_id(snapshot_id).await
    }

    async fn get_by_id(&self, id: Uuid) -> DocketResult<ArchivedOrder> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('archived_order', $id)",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ArchivedOrderRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "archived_order".into(),
            id: id_str,
        })?;

        row.try_into_archived().map_err(Into::into)
    }

    async fn get_by_order_id(&self, order_id: Uuid) -> DocketResult<Option<ArchivedOrder>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM archived_order \
                 WHERE order_id = $order_id",
            )
            .bind(("order_id", order_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ArchivedOrderRow> = result.take(0).map_err(DbError::from)?;
        let archived = rows
            .into_iter()
            .next()
            .map(ArchivedOrderRow::try_into_archived)
            .transpose()?;
        Ok(archived)
    }

    async fn list(
        &self,
        filter: ArchivedOrderFilter,
        pagination: Pagination,
    ) -> DocketResult<PaginatedResult<ArchivedOrder>> {
        let clause = if filter.owner_id.is_some() {
            " WHERE created_by = $owner_id"
        } else {
            ""
        };

        let mut builder = self
            .db
            .query(format!(
                "SELECT count() AS total FROM archived_order{clause} GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM archived_order{clause} \
                 ORDER BY archived_at DESC LIMIT $limit START $offset;"
            ))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(owner_id) = filter.owner_id {
            builder = builder.bind(("owner_id", owner_id.to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let rows: Vec<ArchivedOrderRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ArchivedOrderRow::try_into_archived)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn restore(&self, input: RestoreOrder) -> DocketResult<Order> {
        let order_id = input.order_id;
        let query = transaction(&format!(
            "{}\n{UNFLAG_ORDER}\n{}\
             DELETE type::record('archived_order', $archived_id);\n\
             {HISTORY_INSERT}",
            require_rows(SNAPSHOT_BY_ID),
            restore_grant_statements(&input)
        ));

        let mut builder = self
            .db
            .query(query)
            .bind(("order_id", order_id.to_string()))
            .bind(("archived_id", input.archived_order_id.to_string()));

        for (i, grant) in input.grants.user_grants.iter().enumerate() {
            let caps = grant.capabilities;
            builder = builder
                .bind((format!("ug{i}_id"), grant.id.to_string()))
                .bind((format!("ug{i}_user_id"), grant.user_id.to_string()))
                .bind((format!("ug{i}_can_view"), caps.view))
                .bind((format!("ug{i}_can_edit"), caps.edit))
                .bind((format!("ug{i}_can_delete"), caps.delete))
                .bind((format!("ug{i}_can_share"), caps.share))
                .bind((format!("ug{i}_can_download"), caps.download))
                .bind((format!("ug{i}_can_print"), caps.print))
                .bind((format!("ug{i}_can_comment"), caps.comment))
                .bind((format!("ug{i}_can_approve"), caps.approve))
                .bind((format!("ug{i}_granted_by"), grant.granted_by.to_string()))
                .bind((format!("ug{i}_granted_at"), grant.granted_at))
                .bind((format!("ug{i}_expires_at"), grant.expires_at))
                .bind((format!("ug{i}_notes"), grant.notes.clone()));
        }
        for (i, grant) in input.grants.department_grants.iter().enumerate() {
            let caps = grant.capabilities;
            builder = builder
                .bind((format!("dg{i}_id"), grant.id.to_string()))
                .bind((
                    format!("dg{i}_department_id"),
                    grant.department_id.to_string(),
                ))
                .bind((format!("dg{i}_can_view"), caps.view))
                .bind((format!("dg{i}_can_edit"), caps.edit))
                .bind((format!("dg{i}_can_download"), caps.download))
                .bind((format!("dg{i}_can_share"), caps.share))
                .bind((format!("dg{i}_granted_by"), grant.granted_by.to_string()))
                .bind((format!("dg{i}_granted_at"), grant.granted_at))
                .bind((format!("dg{i}_expires_at"), grant.expires_at))
                .bind((format!("dg{i}_notes"), grant.notes.clone()));
        }
        for (i, exception) in input.grants.user_exceptions.iter().enumerate() {
            builder = builder
                .bind((format!("ue{i}_id"), exception.id.to_string()))
                .bind((format!("ue{i}_user_id"), exception.user_id.to_string()))
                .bind((
                    format!("ue{i}_created_by"),
                    exception.created_by.to_string(),
                ))
                .bind((format!("ue{i}_created_at"), exception.created_at))
                .bind((format!("ue{i}_expires_at"), exception.expires_at))
                .bind((format!("ue{i}_is_active"), exception.is_active))
                .bind((format!("ue{i}_reason"), exception.reason.clone()));
        }

        let result = bind_history!(builder, HistoryParams::new(input.history))
            .await
            .map_err(DbError::from)?;

        let archived_id = input.archived_order_id;
        result
            .check()
            .map_err(|e| DbError::from_guarded("archived_order", archived_id, e))?;

        debug!(order_id = %order_id, "Restore transaction committed");
        fetch_order(&self.db, order_id).await
    }

    async fn purge(&self, id: Uuid, history: CreateOrderHistory) -> DocketResult<()> {
        let query = transaction(&format!(
            "{}\nDELETE type::record('archived_order', $archived_id);\n{HISTORY_INSERT}",
            require_rows(SNAPSHOT_BY_ID)
        ));

        let builder = self
            .db
            .query(query)
            .bind(("archived_id", id.to_string()));
        let result = bind_history!(builder, HistoryParams::new(history))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::from_guarded("archived_order", id, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_guard_checks_duplicates_before_grants() {
        let guard = archive_guard();
        let duplicate = guard.find(DUPLICATE_ROW).unwrap();
        let stale = guard.find(STALE_GRANTS).unwrap();
        assert!(duplicate < stale);
        for key in ["$user_grant_ids", "$department_grant_ids", "$user_exception_ids"] {
            assert!(guard.contains(key), "{key}");
        }
    }
    use docket_core::models::capability::{Capabilities, DepartmentCapabilities};
    use docket_core::models::grant::{DepartmentGrant, OrderGrants, UserGrant};
    use docket_core::models::history::HistoryAction;

    fn restore_input(grants: OrderGrants) -> RestoreOrder {
        let order_id = Uuid::new_v4();
        RestoreOrder {
            archived_order_id: Uuid::new_v4(),
            order_id,
            grants,
            history: CreateOrderHistory {
                order_id,
                action: HistoryAction::Restored,
                old_value: None,
                new_value: None,
                description: "restored".into(),
                performed_by: Uuid::new_v4(),
                ip_address: None,
                user_agent: None,
                notes: None,
            },
        }
    }

    #[test]
    fn no_grant_statements_without_grants() {
        assert!(restore_grant_statements(&restore_input(OrderGrants::default())).is_empty());
    }

    #[test]
    fn grant_statements_are_numbered_per_row() {
        let now = Utc::now();
        let user_grant = |user_id| UserGrant {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            user_id,
            capabilities: Capabilities::view_only(),
            granted_by: Uuid::new_v4(),
            granted_at: now,
            expires_at: None,
            notes: None,
        };
        let grants = OrderGrants {
            user_grants: vec![user_grant(Uuid::new_v4()), user_grant(Uuid::new_v4())],
            department_grants: vec![DepartmentGrant {
                id: Uuid::new_v4(),
                order_id: Uuid::new_v4(),
                department_id: Uuid::new_v4(),
                capabilities: DepartmentCapabilities {
                    view: true,
                    ..Default::default()
                },
                granted_by: Uuid::new_v4(),
                granted_at: now,
                expires_at: None,
                notes: None,
            }],
            user_exceptions: Vec::new(),
        };

        let sql = restore_grant_statements(&restore_input(grants));
        assert_eq!(sql.matches("CREATE type::record('user_grant'").count(), 2);
        assert!(sql.contains("$ug1_user_id"));
        assert!(sql.contains("$dg0_department_id"));
        assert!(!sql.contains("$ue0_id"));
    }
}
