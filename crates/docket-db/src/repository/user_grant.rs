//! SurrealDB implementation of [`UserGrantRepository`].

use chrono::{DateTime, Utc};
use docket_core::error::DocketResult;
use docket_core::models::capability::Capabilities;
use docket_core::models::grant::{CreateUserGrant, UserGrant};
use docket_core::models::history::CreateOrderHistory;
use docket_core::repository::UserGrantRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::history::{HISTORY_INSERT, HistoryParams};
use super::{parse_uuid, require_rows, transaction};
use crate::error::DbError;

/// Capability columns bound from `$can_*`; shared by create and replace.
const CAPABILITY_SETS: &str = "\
can_view = $can_view, can_edit = $can_edit, \
can_delete = $can_delete, can_share = $can_share, \
can_download = $can_download, can_print = $can_print, \
can_comment = $can_comment, can_approve = $can_approve";

#[derive(Debug, SurrealValue)]
struct UserGrantRow {
    record_id: String,
    order_id: String,
    user_id: String,
    can_view: bool,
    can_edit: bool,
    can_delete: bool,
    can_share: bool,
    can_download: bool,
    can_print: bool,
    can_comment: bool,
    can_approve: bool,
    granted_by: String,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    notes: Option<String>,
}

impl UserGrantRow {
    fn try_into_grant(self) -> Result<UserGrant, DbError> {
        Ok(UserGrant {
            id: parse_uuid("user_grant", &self.record_id)?,
            order_id: parse_uuid("user_grant", &self.order_id)?,
            user_id: parse_uuid("user_grant", &self.user_id)?,
            capabilities: Capabilities {
                view: self.can_view,
                edit: self.can_edit,
                delete: self.can_delete,
                share: self.can_share,
                download: self.can_download,
                print: self.can_print,
                comment: self.can_comment,
                approve: self.can_approve,
            },
            granted_by: parse_uuid("user_grant", &self.granted_by)?,
            granted_at: self.granted_at,
            expires_at: self.expires_at,
            notes: self.notes,
        })
    }
}

/// Selects the grant addressed by `$order_id` and `$user_id`.
const GRANT_FOR_PAIR: &str =
    "SELECT VALUE id FROM user_grant WHERE order_id = $order_id AND user_id = $user_id";

/// SurrealDB implementation of the direct user grant store.
#[derive(Clone)]
pub struct SurrealUserGrantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserGrantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Run `statement` followed by the history insert in one transaction.
    async fn write(
        &self,
        statement: &str,
        record_id: Option<Uuid>,
        input: CreateUserGrant,
        history: CreateOrderHistory,
    ) -> DocketResult<UserGrant> {
        let order_id = input.order_id;
        let user_id = input.user_id;
        let caps = input.capabilities;

        let builder = self
            .db
            .query(transaction(&format!("{statement}\n{HISTORY_INSERT}")))
            .bind(("id", record_id.map(|id| id.to_string())))
            .bind(("order_id", order_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .bind(("can_view", caps.view))
            .bind(("can_edit", caps.edit))
            .bind(("can_delete", caps.delete))
            .bind(("can_share", caps.share))
            .bind(("can_download", caps.download))
            .bind(("can_print", caps.print))
            .bind(("can_comment", caps.comment))
            .bind(("can_approve", caps.approve))
            .bind(("granted_by", input.granted_by.to_string()))
            .bind(("expires_at", input.expires_at))
            .bind(("notes", input.notes));
        let result = bind_history!(builder, HistoryParams::new(history))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::from_guarded("user_grant", format!("{order_id}/{user_id}"), e))?;

        self.get(order_id, user_id)
            .await?
            .ok_or_else(|| DbError::NotFound {
                entity: "user_grant".into(),
                id: format!("{order_id}/{user_id}"),
            })
            .map_err(Into::into)
    }
}

impl<C: Connection> UserGrantRepository for SurrealUserGrantRepository<C> {
    async fn get(&self, order_id: Uuid, user_id: Uuid) -> DocketResult<Option<UserGrant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_grant \
                 WHERE order_id = $order_id AND user_id = $user_id",
            )
            .bind(("order_id", order_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserGrantRow> = result.take(0).map_err(DbError::from)?;
        let grant = rows
            .into_iter()
            .next()
            .map(UserGrantRow::try_into_grant)
            .transpose()?;
        Ok(grant)
    }

    async fn list_by_order(&self, order_id: Uuid) -> DocketResult<Vec<UserGrant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_grant \
                 WHERE order_id = $order_id ORDER BY granted_at ASC",
            )
            .bind(("order_id", order_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserGrantRow> = result.take(0).map_err(DbError::from)?;
        let grants = rows
            .into_iter()
            .map(UserGrantRow::try_into_grant)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(grants)
    }

    async fn create(
        &self,
        input: CreateUserGrant,
        history: CreateOrderHistory,
    ) -> DocketResult<UserGrant> {
        let statement = format!(
            "CREATE type::record('user_grant', $id) SET \
             order_id = $order_id, user_id = $user_id, {CAPABILITY_SETS}, \
             granted_by = $granted_by, expires_at = $expires_at, \
             notes = $notes;"
        );
        self.write(&statement, Some(Uuid::new_v4()), input, history)
            .await
    }

    async fn replace(
        &self,
        input: CreateUserGrant,
        history: CreateOrderHistory,
    ) -> DocketResult<UserGrant> {
        let statement = format!(
            "{}\n\
             UPDATE user_grant SET {CAPABILITY_SETS}, \
             granted_by = $granted_by, granted_at = time::now(), \
             expires_at = $expires_at, notes = $notes \
             WHERE order_id = $order_id AND user_id = $user_id;",
            require_rows(GRANT_FOR_PAIR)
        );
        self.write(&statement, None, input, history).await
    }

    async fn delete(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        history: CreateOrderHistory,
    ) -> DocketResult<()> {
        let query = transaction(&format!(
            "{}\n\
             DELETE user_grant WHERE order_id = $order_id AND user_id = $user_id;\n\
             {HISTORY_INSERT}",
            require_rows(GRANT_FOR_PAIR)
        ));

        let builder = self
            .db
            .query(query)
            .bind(("order_id", order_id.to_string()))
            .bind(("user_id", user_id.to_string()));
        let result = bind_history!(builder, HistoryParams::new(history))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::from_guarded("user_grant", format!("{order_id}/{user_id}"), e))?;

        Ok(())
    }
}
