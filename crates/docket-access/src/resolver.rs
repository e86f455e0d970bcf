//! Effective-permission resolution.
//!
//! [`resolve`] is the pure decision over already-loaded facts;
//! [`PermissionResolver`] loads those facts from the stores. Exceptions
//! suppress only department-derived access: a direct user grant always
//! survives an exception.

use chrono::{DateTime, Utc};
use docket_core::context::RequestContext;
use docket_core::error::DocketResult;
use docket_core::models::capability::{Capabilities, DepartmentCapabilities, EffectivePermissions};
use docket_core::models::grant::{DepartmentGrant, UserException, UserGrant};
use docket_core::models::order::Order;
use docket_core::repository::{
    DepartmentGrantRepository, DirectoryRepository, OrderRepository, UserExceptionRepository,
    UserGrantRepository,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::AccessError;

/// Stored authorization facts for one (order, user) pair.
#[derive(Debug, Clone, Default)]
pub struct GrantFacts {
    pub user_grant: Option<UserGrant>,
    /// Department grants on the order; entries for departments the user
    /// is not a member of are ignored.
    pub department_grants: Vec<DepartmentGrant>,
    pub exception: Option<UserException>,
}

/// Resolve the capabilities `user_id` holds on `order` at `now`.
///
/// The admin override is not applied here; callers combine the result
/// with the caller's role via [`EffectivePermissions::with_admin_override`].
pub fn resolve(
    order: &Order,
    user_id: Uuid,
    memberships: &[Uuid],
    facts: &GrantFacts,
    now: DateTime<Utc>,
) -> EffectivePermissions {
    if order.is_owned_by(user_id) {
        return EffectivePermissions::owner();
    }
    // Archived orders are frozen: only the owner keeps access.
    if order.is_archived {
        return EffectivePermissions::denied();
    }

    let excepted = facts
        .exception
        .as_ref()
        .is_some_and(|e| e.order_id == order.id && e.user_id == user_id && e.is_active_at(now));

    let mut caps = if excepted {
        Capabilities::none()
    } else {
        facts
            .department_grants
            .iter()
            .filter(|g| {
                g.order_id == order.id
                    && memberships.contains(&g.department_id)
                    && g.is_active_at(now)
            })
            .fold(DepartmentCapabilities::default(), |acc, g| {
                acc.union(g.capabilities)
            })
            .into()
    };

    if let Some(grant) = facts
        .user_grant
        .as_ref()
        .filter(|g| g.order_id == order.id && g.user_id == user_id && g.is_active_at(now))
    {
        caps = caps.union(grant.capabilities);
    }

    if order.is_public && !excepted {
        caps.view = true;
    }

    caps.into()
}

/// Loads grant facts from the stores and resolves them.
///
/// Generic over repository implementations so that the access layer
/// has no dependency on the database crate.
#[derive(Clone)]
pub struct PermissionResolver<O, G, D, E, R> {
    pub(crate) orders: O,
    pub(crate) user_grants: G,
    pub(crate) department_grants: D,
    pub(crate) exceptions: E,
    pub(crate) directory: R,
}

impl<O, G, D, E, R> PermissionResolver<O, G, D, E, R>
where
    O: OrderRepository,
    G: UserGrantRepository,
    D: DepartmentGrantRepository,
    E: UserExceptionRepository,
    R: DirectoryRepository,
{
    pub fn new(orders: O, user_grants: G, department_grants: D, exceptions: E, directory: R) -> Self {
        Self {
            orders,
            user_grants,
            department_grants,
            exceptions,
            directory,
        }
    }

    /// Effective permissions of `user_id` on `order_id`. Fails only when
    /// the order does not exist.
    pub async fn get_effective_permissions(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> DocketResult<EffectivePermissions> {
        let order = self.orders.get_by_id(order_id).await?;
        self.resolve_order(&order, user_id).await
    }

    /// Resolve against an order the caller already loaded.
    pub async fn resolve_order(
        &self,
        order: &Order,
        user_id: Uuid,
    ) -> DocketResult<EffectivePermissions> {
        if order.is_owned_by(user_id) {
            return Ok(EffectivePermissions::owner());
        }
        if order.is_archived {
            return Ok(EffectivePermissions::denied());
        }

        let memberships = self.directory.department_memberships(user_id).await?;
        let facts = GrantFacts {
            user_grant: self.user_grants.get(order.id, user_id).await?,
            department_grants: self
                .department_grants
                .list_for_departments(order.id, &memberships)
                .await?,
            exception: self.exceptions.get(order.id, user_id).await?,
        };

        let permissions = resolve(order, user_id, &memberships, &facts, Utc::now());
        debug!(
            order_id = %order.id,
            user_id = %user_id,
            can_view = permissions.can_view,
            "Resolved effective permissions"
        );
        Ok(permissions)
    }

    /// The caller's permissions with the admin override applied.
    pub(crate) async fn for_caller(
        &self,
        order: &Order,
        ctx: &RequestContext,
    ) -> DocketResult<EffectivePermissions> {
        Ok(self
            .resolve_order(order, ctx.actor_id)
            .await?
            .with_admin_override(ctx.is_admin))
    }

    /// Owner-or-admin gate shared by every management operation.
    pub(crate) async fn require_owner_or_admin(
        &self,
        order: &Order,
        ctx: &RequestContext,
        action: &'static str,
    ) -> DocketResult<()> {
        let permissions = self.for_caller(order, ctx).await?;
        if permissions.is_owner || ctx.is_admin {
            Ok(())
        } else {
            Err(AccessError::NotOwnerOrAdmin { action }.into())
        }
    }
}
