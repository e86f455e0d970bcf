//! SurrealDB implementation of [`UserExceptionRepository`].

use chrono::{DateTime, Utc};
use docket_core::error::DocketResult;
use docket_core::models::grant::{CreateUserException, UserException};
use docket_core::models::history::CreateOrderHistory;
use docket_core::repository::UserExceptionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::history::{HISTORY_INSERT, HistoryParams};
use super::{parse_uuid, require_rows, transaction};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct UserExceptionRow {
    record_id: String,
    order_id: String,
    user_id: String,
    created_by: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    reason: Option<String>,
}

impl UserExceptionRow {
    fn try_into_exception(self) -> Result<UserException, DbError> {
        Ok(UserException {
            id: parse_uuid("user_exception", &self.record_id)?,
            order_id: parse_uuid("user_exception", &self.order_id)?,
            user_id: parse_uuid("user_exception", &self.user_id)?,
            created_by: parse_uuid("user_exception", &self.created_by)?,
            created_at: self.created_at,
            expires_at: self.expires_at,
            is_active: self.is_active,
            reason: self.reason,
        })
    }
}

/// Selects the exception addressed by `$order_id` and `$user_id`.
const EXCEPTION_FOR_PAIR: &str =
    "SELECT VALUE id FROM user_exception WHERE order_id = $order_id AND user_id = $user_id";

/// SurrealDB implementation of the user exception store.
#[derive(Clone)]
pub struct SurrealUserExceptionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserExceptionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn write(
        &self,
        statement: &str,
        record_id: Option<Uuid>,
        input: CreateUserException,
        history: CreateOrderHistory,
    ) -> DocketResult<UserException> {
        let order_id = input.order_id;
        let user_id = input.user_id;

        let builder = self
            .db
            .query(transaction(&format!("{statement}\n{HISTORY_INSERT}")))
            .bind(("id", record_id.map(|id| id.to_string())))
            .bind(("order_id", order_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .bind(("created_by", input.created_by.to_string()))
            .bind(("expires_at", input.expires_at))
            .bind(("reason", input.reason));
        let result = bind_history!(builder, HistoryParams::new(history))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::from_guarded("user_exception", format!("{order_id}/{user_id}"), e))?;

        self.get(order_id, user_id)
            .await?
            .ok_or_else(|| DbError::NotFound {
                entity: "user_exception".into(),
                id: format!("{order_id}/{user_id}"),
            })
            .map_err(Into::into)
    }
}

impl<C: Connection> UserExceptionRepository for SurrealUserExceptionRepository<C> {
    async fn get(&self, order_id: Uuid, user_id: Uuid) -> DocketResult<Option<UserException>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_exception \
                 WHERE order_id = $order_id AND user_id = $user_id",
            )
            .bind(("order_id", order_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserExceptionRow> = result.take(0).map_err(DbError::from)?;
        let exception = rows
            .into_iter()
            .next()
            .map(UserExceptionRow::try_into_exception)
            .transpose()?;
        Ok(exception)
    }

    async fn list_by_order(&self, order_id: Uuid) -> DocketResult<Vec<UserException>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_exception \
                 WHERE order_id = $order_id ORDER BY created_at ASC",
            )
            .bind(("order_id", order_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserExceptionRow> = result.take(0).map_err(DbError::from)?;
        let exceptions = rows
            .into_iter()
            .map(UserExceptionRow::try_into_exception)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(exceptions)
    }

    async fn create(
        &self,
        input: CreateUserException,
        history: CreateOrderHistory,
    ) -> DocketResult<UserException> {
        let statement = "CREATE type::record('user_exception', $id) SET \
             order_id = $order_id, user_id = $user_id, \
             created_by = $created_by, expires_at = $expires_at, \
             is_active = true, reason = $reason;";
        self.write(statement, Some(Uuid::new_v4()), input, history)
            .await
    }

    async fn replace(
        &self,
        input: CreateUserException,
        history: CreateOrderHistory,
    ) -> DocketResult<UserException> {
        let statement = format!(
            "{}\n\
             UPDATE user_exception SET \
             created_by = $created_by, created_at = time::now(), \
             expires_at = $expires_at, is_active = true, reason = $reason \
             WHERE order_id = $order_id AND user_id = $user_id;",
            require_rows(EXCEPTION_FOR_PAIR)
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
             DELETE user_exception WHERE order_id = $order_id \
             AND user_id = $user_id;\n{HISTORY_INSERT}",
            require_rows(EXCEPTION_FOR_PAIR)
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
            .map_err(|e| DbError::from_guarded("user_exception", format!("{order_id}/{user_id}"), e))?;

        Ok(())
    }
}
