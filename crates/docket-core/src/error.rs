//! Error types for the Docket system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocketError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Access denied: {reason}")]
    Forbidden { reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Business rule violated: {message}")]
    BusinessRule { message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocketError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::BusinessRule {
            message: message.into(),
        }
    }

    /// HTTP-equivalent status code reported to callers and the activity log.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Forbidden { .. } => 403,
            Self::Validation { .. } | Self::BusinessRule { .. } => 400,
            Self::AlreadyExists { .. } => 409,
            Self::Serialization(_) | Self::Database(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for DocketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type DocketResult<T> = Result<T, DocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(DocketError::not_found("order", 42).status_code(), 404);
        assert_eq!(DocketError::forbidden("nope").status_code(), 403);
        assert_eq!(DocketError::validation("empty").status_code(), 400);
        assert_eq!(DocketError::business_rule("archived").status_code(), 400);
        assert_eq!(
            DocketError::Database("connection reset".into()).status_code(),
            500
        );
    }

    #[test]
    fn display_includes_reason() {
        let err = DocketError::forbidden("only the owner may share this order");
        assert_eq!(
            err.to_string(),
            "Access denied: only the owner may share this order"
        );
    }
}
