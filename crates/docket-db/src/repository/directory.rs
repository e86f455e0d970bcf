//! SurrealDB-backed reference copy of the identity provider and the
//! department catalog.

use docket_core::error::DocketResult;
use docket_core::models::directory::{Department, DirectoryUser};
use docket_core::repository::DirectoryRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct DirectoryUserRow {
    record_id: String,
    display_name: String,
    is_admin: bool,
}

#[derive(Debug, SurrealValue)]
struct DepartmentRow {
    record_id: String,
    name: String,
}

/// SurrealDB implementation of the directory.
#[derive(Clone)]
pub struct SurrealDirectoryRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDirectoryRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    pub async fn create_user(
        &self,
        display_name: &str,
        is_admin: bool,
    ) -> DocketResult<DirectoryUser> {
        let id = Uuid::new_v4();

        let mut result = self
            .db
            .query(
                "CREATE type::record('directory_user', $id) SET \
                 display_name = $display_name, is_admin = $is_admin; \
                 SELECT meta::id(id) AS record_id, display_name, is_admin \
                 FROM type::record('directory_user', $id);",
            )
            .bind(("id", id.to_string()))
            .bind(("display_name", display_name.to_string()))
            .bind(("is_admin", is_admin))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DirectoryUserRow> = result.take(1).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Query("directory user insert returned no record".into()))?;

        Ok(DirectoryUser {
            id: parse_uuid("directory_user", &row.record_id)?,
            display_name: row.display_name,
            is_admin: row.is_admin,
        })
    }

    pub async fn create_department(&self, name: &str) -> DocketResult<Department> {
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(
                "CREATE type::record('department', $id) SET name = $name; \
                 SELECT meta::id(id) AS record_id, name \
                 FROM type::record('department', $id);",
            )
            .bind(("id", id.to_string()))
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("department", e))?;
        let rows: Vec<DepartmentRow> = result.take(1).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Query("department insert returned no record".into()))?;

        Ok(Department {
            id: parse_uuid("department", &row.record_id)?,
            name: row.name,
        })
    }

    /// Make `user_id` a member of `department_id`. Adding an existing
    /// membership is a no-op.
    pub async fn add_member(&self, user_id: Uuid, department_id: Uuid) -> DocketResult<()> {
        if !self.user_exists(user_id).await? {
            return Err(DbError::NotFound {
                entity: "directory_user".into(),
                id: user_id.to_string(),
            }
            .into());
        }
        if !self.department_exists(department_id).await? {
            return Err(DbError::NotFound {
                entity: "department".into(),
                id: department_id.to_string(),
            }
            .into());
        }
        if self
            .department_memberships(user_id)
            .await?
            .contains(&department_id)
        {
            return Ok(());
        }

        let query = format!(
            "RELATE directory_user:`{user_id}` -> member_of -> department:`{department_id}`;"
        );
        self.db
            .query(query)
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    pub async fn remove_member(&self, user_id: Uuid, department_id: Uuid) -> DocketResult<()> {
        self.db
            .query(
                "DELETE member_of WHERE \
                 in = type::record('directory_user', $user_id) AND \
                 out = type::record('department', $department_id)",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("department_id", department_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn count(&self, table: &str, id: Uuid) -> DocketResult<u64> {
        let mut result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM {table} \
                 WHERE id = type::record('{table}', $id) GROUP ALL"
            ))
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}

impl<C: Connection> DirectoryRepository for SurrealDirectoryRepository<C> {
    async fn user_exists(&self, user_id: Uuid) -> DocketResult<bool> {
        Ok(self.count("directory_user", user_id).await? > 0)
    }

    async fn department_exists(&self, department_id: Uuid) -> DocketResult<bool> {
        Ok(self.count("department", department_id).await? > 0)
    }

    async fn is_admin(&self, user_id: Uuid) -> DocketResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, display_name, is_admin \
                 FROM type::record('directory_user', $id)",
            )
            .bind(("id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DirectoryUserRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().is_some_and(|row| row.is_admin))
    }

    async fn department_memberships(&self, user_id: Uuid) -> DocketResult<Vec<Uuid>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, name FROM department \
                 WHERE id IN (\
                     SELECT VALUE out FROM member_of \
                     WHERE in = type::record('directory_user', $user_id)\
                 )",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DepartmentRow> = result.take(0).map_err(DbError::from)?;
        let ids = rows
            .iter()
            .map(|row| parse_uuid("department", &row.record_id))
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(ids)
    }
}
