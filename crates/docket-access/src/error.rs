//! Rule violations raised by the access and lifecycle services.

use docket_core::error::DocketError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("only the order owner or an administrator may {action}")]
    NotOwnerOrAdmin { action: &'static str },

    #[error("only an administrator may {action}")]
    AdminOnly { action: &'static str },

    #[error("you do not have permission to view this order")]
    CannotView,

    #[error("order is archived and cannot be modified")]
    OrderArchived,

    #[error("order is already archived")]
    AlreadyArchived,

    #[error("order is not archived")]
    NotArchived,

    #[error("archived order cannot be restored")]
    NotRestorable,

    #[error("archived order snapshot failed its integrity check")]
    DigestMismatch,

    #[error("at least one capability must be granted")]
    EmptyCapabilities,

    #[error("the order owner already has full access")]
    TargetIsOwner,

    #[error("expiry must be in the future")]
    ExpiryInPast,

    #[error("expiration window must be between 1 and {max} days, got {days}")]
    InvalidWindow { days: u32, max: u32 },

    #[error("user {0} does not exist")]
    UnknownUser(Uuid),

    #[error("department {0} does not exist")]
    UnknownDepartment(Uuid),
}

impl From<AccessError> for DocketError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::NotOwnerOrAdmin { .. }
            | AccessError::AdminOnly { .. }
            | AccessError::CannotView => DocketError::Forbidden {
                reason: err.to_string(),
            },
            AccessError::OrderArchived
            | AccessError::AlreadyArchived
            | AccessError::NotArchived
            | AccessError::NotRestorable
            | AccessError::DigestMismatch => DocketError::BusinessRule {
                message: err.to_string(),
            },
            AccessError::EmptyCapabilities
            | AccessError::TargetIsOwner
            | AccessError::ExpiryInPast
            | AccessError::InvalidWindow { .. }
            | AccessError::UnknownUser(_)
            | AccessError::UnknownDepartment(_) => DocketError::Validation {
                message: err.to_string(),
            },
        }
    }
}
