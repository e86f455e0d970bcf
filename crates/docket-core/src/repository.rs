//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Every mutating operation that
//! changes grants or lifecycle state takes the [`CreateOrderHistory`] row
//! describing it and must persist both in a single transaction.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DocketResult;
use crate::models::{
    activity::{CreateActivityLog, OrderActivityLog},
    archive::{ArchiveOrder, ArchivedOrder, ArchivedOrderFilter, RestoreOrder},
    attachment::AttachmentInfo,
    grant::{
        CreateDepartmentGrant, CreateUserException, CreateUserGrant, DepartmentGrant, UserException,
        UserGrant,
    },
    history::{CreateOrderHistory, OrderHistory},
    order::{CreateOrder, Order},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub trait OrderRepository: Send + Sync {
    fn create(&self, input: CreateOrder) -> impl Future<Output = DocketResult<Order>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = DocketResult<Order>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = DocketResult<PaginatedResult<Order>>> + Send;

    /// Non-archived orders whose expiration date is at or before `now`.
    fn list_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = DocketResult<Vec<Order>>> + Send;

    /// Non-archived orders expiring in the window `(from, until]`.
    fn list_expiring_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = DocketResult<Vec<Order>>> + Send;

    /// Set (`Some`) or clear (`None`) the expiration date.
    fn set_expiration_date(
        &self,
        id: Uuid,
        expiration_date: Option<DateTime<Utc>>,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<Order>> + Send;
}

// ---------------------------------------------------------------------------
// Grant stores
// ---------------------------------------------------------------------------

pub trait UserGrantRepository: Send + Sync {
    fn get(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = DocketResult<Option<UserGrant>>> + Send;
    fn list_by_order(
        &self,
        order_id: Uuid,
    ) -> impl Future<Output = DocketResult<Vec<UserGrant>>> + Send;

    /// Insert a new grant. Fails with `AlreadyExists` when the
    /// (order, user) pair is already taken.
    fn create(
        &self,
        input: CreateUserGrant,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<UserGrant>> + Send;

    /// Replace the capability set, expiry and notes of an existing grant
    /// in place.
    fn replace(
        &self,
        input: CreateUserGrant,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<UserGrant>> + Send;

    fn delete(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<()>> + Send;
}

pub trait DepartmentGrantRepository: Send + Sync {
    fn get(
        &self,
        order_id: Uuid,
        department_id: Uuid,
    ) -> impl Future<Output = DocketResult<Option<DepartmentGrant>>> + Send;
    fn list_by_order(
        &self,
        order_id: Uuid,
    ) -> impl Future<Output = DocketResult<Vec<DepartmentGrant>>> + Send;

    /// Grants on `order_id` held by any of `department_ids`.
    fn list_for_departments(
        &self,
        order_id: Uuid,
        department_ids: &[Uuid],
    ) -> impl Future<Output = DocketResult<Vec<DepartmentGrant>>> + Send;

    fn create(
        &self,
        input: CreateDepartmentGrant,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<DepartmentGrant>> + Send;
    fn replace(
        &self,
        input: CreateDepartmentGrant,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<DepartmentGrant>> + Send;
    fn delete(
        &self,
        order_id: Uuid,
        department_id: Uuid,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<()>> + Send;
}

pub trait UserExceptionRepository: Send + Sync {
    fn get(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = DocketResult<Option<UserException>>> + Send;
    fn list_by_order(
        &self,
        order_id: Uuid,
    ) -> impl Future<Output = DocketResult<Vec<UserException>>> + Send;
    fn create(
        &self,
        input: CreateUserException,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<UserException>> + Send;

    /// Replace an existing exception for the pair; the replacement is
    /// always active.
    fn replace(
        &self,
        input: CreateUserException,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<UserException>> + Send;
    fn delete(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

pub trait HistoryRepository: Send + Sync {
    /// History of one order, newest first.
    fn list_by_order(
        &self,
        order_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = DocketResult<PaginatedResult<OrderHistory>>> + Send;
}

/// Query filters for activity log entries.
#[derive(Debug, Clone, Default)]
pub struct ActivityLogFilter {
    pub order_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub is_success: Option<bool>,
}

pub trait ActivityLogRepository: Send + Sync {
    /// Append a new activity row. No update or delete operations exist.
    fn append(
        &self,
        input: CreateActivityLog,
    ) -> impl Future<Output = DocketResult<OrderActivityLog>> + Send;
    fn list(
        &self,
        filter: ActivityLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = DocketResult<PaginatedResult<OrderActivityLog>>> + Send;
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

pub trait ArchiveRepository: Send + Sync {
    /// Write the snapshot, flag the order archived, remove its live grants
    /// and append history, all or nothing.
    fn archive(
        &self,
        input: ArchiveOrder,
    ) -> impl Future<Output = DocketResult<ArchivedOrder>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = DocketResult<ArchivedOrder>> + Send;
    fn get_by_order_id(
        &self,
        order_id: Uuid,
    ) -> impl Future<Output = DocketResult<Option<ArchivedOrder>>> + Send;
    fn list(
        &self,
        filter: ArchivedOrderFilter,
        pagination: Pagination,
    ) -> impl Future<Output = DocketResult<PaginatedResult<ArchivedOrder>>> + Send;

    /// Unflag the order, re-create the given grants, delete the snapshot
    /// and append history, all or nothing.
    fn restore(&self, input: RestoreOrder) -> impl Future<Output = DocketResult<Order>> + Send;

    /// Remove the snapshot for good. The order row stays as an archived
    /// shell.
    fn purge(
        &self,
        id: Uuid,
        history: CreateOrderHistory,
    ) -> impl Future<Output = DocketResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// External collaborators
// ---------------------------------------------------------------------------

/// Read-only view of the identity provider and department catalog.
pub trait DirectoryRepository: Send + Sync {
    fn user_exists(&self, user_id: Uuid) -> impl Future<Output = DocketResult<bool>> + Send;
    fn department_exists(
        &self,
        department_id: Uuid,
    ) -> impl Future<Output = DocketResult<bool>> + Send;
    fn is_admin(&self, user_id: Uuid) -> impl Future<Output = DocketResult<bool>> + Send;
    /// Departments the user currently belongs to.
    fn department_memberships(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = DocketResult<Vec<Uuid>>> + Send;
}

pub trait AttachmentRepository: Send + Sync {
    fn list_for_order(
        &self,
        order_id: Uuid,
    ) -> impl Future<Output = DocketResult<Vec<AttachmentInfo>>> + Send;
}
