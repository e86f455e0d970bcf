//! Docket Access: effective-permission resolution, grant management,
//! the expiration/archive lifecycle and request activity logging.

pub mod activity;
pub mod config;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod permission;
pub mod resolver;

pub use activity::{ActivityLogger, RequestInfo};
pub use config::{AccessConfig, ArchiveGrantPolicy};
pub use error::AccessError;
pub use history::HistoryService;
pub use lifecycle::LifecycleService;
pub use permission::{
    GrantDepartmentAccess, GrantUserPermission, PermissionService, UpdateDepartmentAccess,
    UpdateUserPermission, UserExceptionInput,
};
pub use resolver::{GrantFacts, PermissionResolver, resolve};
