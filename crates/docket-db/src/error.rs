//! Database-specific error types and conversions.

use std::fmt::Display;

use docket_core::error::DocketError;

use crate::repository::{DUPLICATE_ROW, MISSING_ROW, STALE_GRANTS};

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Unique constraint violated on {entity}: {detail}")]
    Conflict { entity: String, detail: String },

    #[error("Corrupt {entity} row: {detail}")]
    Corrupt { entity: String, detail: String },

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Stale {entity} write: order grants changed while it was prepared")]
    Stale { entity: String },
}

impl DbError {
    /// Classify a failed statement. Unique index and duplicate record id
    /// violations become [`DbError::Conflict`]; the whole transaction has
    /// already been cancelled by the server.
    pub(crate) fn from_statement(entity: &str, err: surrealdb::Error) -> Self {
        let detail = err.to_string();
        if detail.contains("already contains") || detail.contains("already exists") {
            DbError::Conflict {
                entity: entity.into(),
                detail,
            }
        } else {
            DbError::Query(detail)
        }
    }

    /// Classify a failed statement of a transaction that starts with a
    /// guard statement. The guard's marker decides the variant; anything
    /// else is classified by [`DbError::from_statement`].
    pub(crate) fn from_guarded(entity: &str, id: impl Display, err: surrealdb::Error) -> Self {
        let detail = err.to_string();
        if detail.contains(MISSING_ROW) {
            DbError::NotFound {
                entity: entity.into(),
                id: id.to_string(),
            }
        } else if detail.contains(DUPLICATE_ROW) {
            DbError::Conflict {
                entity: entity.into(),
                detail,
            }
        } else if detail.contains(STALE_GRANTS) {
            DbError::Stale {
                entity: entity.into(),
            }
        } else {
            Self::from_statement(entity, err)
        }
    }

    pub(crate) fn corrupt(entity: &str, detail: impl std::fmt::Display) -> Self {
        DbError::Corrupt {
            entity: entity.into(),
            detail: detail.to_string(),
        }
    }
}

impl From<DbError> for DocketError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => DocketError::NotFound { entity, id },
            DbError::Conflict { entity, .. } => DocketError::AlreadyExists { entity },
            DbError::Stale { entity } => DocketError::business_rule(format!(
                "order grants changed while the {entity} write was prepared; retry"
            )),
            other => DocketError::Database(other.to_string()),
        }
    }
}
