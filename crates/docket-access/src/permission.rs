//! Permission management: direct user grants, department grants and
//! user exceptions.
//!
//! Every operation loads the order, re-resolves the caller and requires
//! ownership or the admin role. Every mutation is written together with
//! its history row in one storage transaction.

use chrono::{DateTime, Utc};
use docket_core::context::RequestContext;
use docket_core::error::{DocketError, DocketResult};
use docket_core::models::capability::{Capabilities, DepartmentCapabilities, EffectivePermissions};
use docket_core::models::grant::{
    CreateDepartmentGrant, CreateUserException, CreateUserGrant, DepartmentGrant, UserException,
    UserGrant,
};
use docket_core::models::history::{CreateOrderHistory, HistoryAction};
use docket_core::models::order::Order;
use docket_core::repository::{
    DepartmentGrantRepository, DirectoryRepository, OrderRepository, UserExceptionRepository,
    UserGrantRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AccessError;
use crate::history::entry;
use crate::resolver::PermissionResolver;

const MANAGE_PERMISSIONS: &str = "manage permissions on this order";
const VIEW_PERMISSIONS: &str = "view permissions on this order";

/// Grant (or replace) a direct user grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantUserPermission {
    pub user_id: Uuid,
    pub capabilities: Capabilities,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserPermission {
    pub capabilities: Capabilities,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantDepartmentAccess {
    pub department_id: Uuid,
    pub capabilities: DepartmentCapabilities,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDepartmentAccess {
    pub capabilities: DepartmentCapabilities,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserExceptionInput {
    pub user_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

fn ensure_future(expires_at: Option<DateTime<Utc>>) -> Result<(), AccessError> {
    match expires_at {
        Some(at) if at <= Utc::now() => Err(AccessError::ExpiryInPast),
        _ => Ok(()),
    }
}

fn ensure_not_archived(order: &Order) -> Result<(), AccessError> {
    if order.is_archived {
        Err(AccessError::OrderArchived)
    } else {
        Ok(())
    }
}

/// Permission management service.
pub struct PermissionService<O, G, D, E, R> {
    resolver: PermissionResolver<O, G, D, E, R>,
}

impl<O, G, D, E, R> PermissionService<O, G, D, E, R>
where
    O: OrderRepository,
    G: UserGrantRepository,
    D: DepartmentGrantRepository,
    E: UserExceptionRepository,
    R: DirectoryRepository,
{
    pub fn new(resolver: PermissionResolver<O, G, D, E, R>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PermissionResolver<O, G, D, E, R> {
        &self.resolver
    }

    pub async fn get_effective_permissions(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> DocketResult<EffectivePermissions> {
        self.resolver
            .get_effective_permissions(order_id, user_id)
            .await
    }

    /// Load the order and check the owner/admin gate.
    async fn load_managed(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        action: &'static str,
    ) -> DocketResult<Order> {
        let order = self.resolver.orders.get_by_id(order_id).await?;
        self.resolver
            .require_owner_or_admin(&order, ctx, action)
            .await?;
        Ok(order)
    }

    /// Load an order for mutation: gate plus not archived.
    async fn load_mutable(&self, order_id: Uuid, ctx: &RequestContext) -> DocketResult<Order> {
        let order = self.load_managed(order_id, ctx, MANAGE_PERMISSIONS).await?;
        ensure_not_archived(&order)?;
        Ok(order)
    }

    async fn ensure_grantee(&self, order: &Order, user_id: Uuid) -> DocketResult<()> {
        if order.is_owned_by(user_id) {
            return Err(AccessError::TargetIsOwner.into());
        }
        if !self.resolver.directory.user_exists(user_id).await? {
            return Err(AccessError::UnknownUser(user_id).into());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Direct user grants
    // -----------------------------------------------------------------------

    /// Create the user's grant, or replace its capability set in place if
    /// one exists.
    pub async fn grant_user_permission(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        input: GrantUserPermission,
    ) -> DocketResult<UserGrant> {
        let order = self.load_mutable(order_id, ctx).await?;
        if input.capabilities.is_empty() {
            return Err(AccessError::EmptyCapabilities.into());
        }
        ensure_future(input.expires_at)?;
        self.ensure_grantee(&order, input.user_id).await?;

        let grant = CreateUserGrant {
            order_id,
            user_id: input.user_id,
            capabilities: input.capabilities,
            granted_by: ctx.actor_id,
            expires_at: input.expires_at,
            notes: input.notes,
        };

        let grants = &self.resolver.user_grants;
        let previous = grants.get(order_id, input.user_id).await?;
        let saved = match previous {
            Some(previous) => {
                grants
                    .replace(grant.clone(), self.grant_history(ctx, &grant, Some(&previous))?)
                    .await?
            }
            None => match grants
                .create(grant.clone(), self.grant_history(ctx, &grant, None)?)
                .await
            {
                Err(DocketError::AlreadyExists { .. }) => {
                    warn!(
                        order_id = %order_id,
                        user_id = %grant.user_id,
                        "Concurrent grant detected, retrying as update"
                    );
                    let previous = grants.get(order_id, grant.user_id).await?;
                    let history = self.grant_history(ctx, &grant, previous.as_ref())?;
                    grants.replace(grant, history).await?
                }
                other => other?,
            },
        };

        info!(
            order_id = %order_id,
            user_id = %saved.user_id,
            actor_id = %ctx.actor_id,
            "User permission granted"
        );
        Ok(saved)
    }

    fn grant_history(
        &self,
        ctx: &RequestContext,
        grant: &CreateUserGrant,
        previous: Option<&UserGrant>,
    ) -> DocketResult<CreateOrderHistory> {
        Ok(CreateOrderHistory {
            old_value: previous
                .map(|p| serde_json::to_value(p.capabilities))
                .transpose()?,
            new_value: Some(serde_json::to_value(grant.capabilities)?),
            ..entry(
                ctx,
                grant.order_id,
                HistoryAction::PermissionGranted,
                format!("Permissions granted to user {}", grant.user_id),
            )
        })
    }

    pub async fn update_user_permission(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        user_id: Uuid,
        input: UpdateUserPermission,
    ) -> DocketResult<UserGrant> {
        self.load_mutable(order_id, ctx).await?;
        if input.capabilities.is_empty() {
            return Err(AccessError::EmptyCapabilities.into());
        }
        ensure_future(input.expires_at)?;

        let previous = self
            .resolver
            .user_grants
            .get(order_id, user_id)
            .await?
            .ok_or_else(|| DocketError::not_found("user_grant", format!("{order_id}/{user_id}")))?;

        let history = CreateOrderHistory {
            old_value: Some(serde_json::to_value(previous.capabilities)?),
            new_value: Some(serde_json::to_value(input.capabilities)?),
            ..entry(
                ctx,
                order_id,
                HistoryAction::PermissionUpdated,
                format!("Permissions updated for user {user_id}"),
            )
        };
        let saved = self
            .resolver
            .user_grants
            .replace(
                CreateUserGrant {
                    order_id,
                    user_id,
                    capabilities: input.capabilities,
                    granted_by: ctx.actor_id,
                    expires_at: input.expires_at,
                    notes: input.notes,
                },
                history,
            )
            .await?;

        info!(order_id = %order_id, user_id = %user_id, "User permission updated");
        Ok(saved)
    }

    /// Remove the grant row. Absence is the only "no grant" state.
    pub async fn revoke_user_permission(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> DocketResult<()> {
        self.load_mutable(order_id, ctx).await?;

        let previous = self
            .resolver
            .user_grants
            .get(order_id, user_id)
            .await?
            .ok_or_else(|| DocketError::not_found("user_grant", format!("{order_id}/{user_id}")))?;

        let history = CreateOrderHistory {
            old_value: Some(serde_json::to_value(previous.capabilities)?),
            ..entry(
                ctx,
                order_id,
                HistoryAction::PermissionRevoked,
                format!("Permissions revoked for user {user_id}"),
            )
        };
        self.resolver
            .user_grants
            .delete(order_id, user_id, history)
            .await?;

        info!(order_id = %order_id, user_id = %user_id, "User permission revoked");
        Ok(())
    }

    pub async fn get_order_user_permissions(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
    ) -> DocketResult<Vec<UserGrant>> {
        self.load_managed(order_id, ctx, VIEW_PERMISSIONS).await?;
        self.resolver.user_grants.list_by_order(order_id).await
    }

    // -----------------------------------------------------------------------
    // Department grants
    // -----------------------------------------------------------------------

    pub async fn grant_department_access(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        input: GrantDepartmentAccess,
    ) -> DocketResult<DepartmentGrant> {
        self.load_mutable(order_id, ctx).await?;
        if input.capabilities.is_empty() {
            return Err(AccessError::EmptyCapabilities.into());
        }
        ensure_future(input.expires_at)?;
        if !self
            .resolver
            .directory
            .department_exists(input.department_id)
            .await?
        {
            return Err(AccessError::UnknownDepartment(input.department_id).into());
        }

        let grant = CreateDepartmentGrant {
            order_id,
            department_id: input.department_id,
            capabilities: input.capabilities,
            granted_by: ctx.actor_id,
            expires_at: input.expires_at,
            notes: input.notes,
        };

        let grants = &self.resolver.department_grants;
        let previous = grants.get(order_id, input.department_id).await?;
        let saved = match previous {
            Some(previous) => {
                let history = self.department_history(ctx, &grant, Some(&previous))?;
                grants.replace(grant, history).await?
            }
            None => match grants
                .create(grant.clone(), self.department_history(ctx, &grant, None)?)
                .await
            {
                Err(DocketError::AlreadyExists { .. }) => {
                    warn!(
                        order_id = %order_id,
                        department_id = %grant.department_id,
                        "Concurrent department grant detected, retrying as update"
                    );
                    let previous = grants.get(order_id, grant.department_id).await?;
                    let history = self.department_history(ctx, &grant, previous.as_ref())?;
                    grants.replace(grant, history).await?
                }
                other => other?,
            },
        };

        info!(
            order_id = %order_id,
            department_id = %saved.department_id,
            "Department access granted"
        );
        Ok(saved)
    }

    fn department_history(
        &self,
        ctx: &RequestContext,
        grant: &CreateDepartmentGrant,
        previous: Option<&DepartmentGrant>,
    ) -> DocketResult<CreateOrderHistory> {
        Ok(CreateOrderHistory {
            old_value: previous
                .map(|p| serde_json::to_value(p.capabilities))
                .transpose()?,
            new_value: Some(serde_json::to_value(grant.capabilities)?),
            ..entry(
                ctx,
                grant.order_id,
                HistoryAction::DepartmentAccessGranted,
                format!("Access granted to department {}", grant.department_id),
            )
        })
    }

    pub async fn update_department_access(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        department_id: Uuid,
        input: UpdateDepartmentAccess,
    ) -> DocketResult<DepartmentGrant> {
        self.load_mutable(order_id, ctx).await?;
        if input.capabilities.is_empty() {
            return Err(AccessError::EmptyCapabilities.into());
        }
        ensure_future(input.expires_at)?;

        let previous = self
            .resolver
            .department_grants
            .get(order_id, department_id)
            .await?
            .ok_or_else(|| {
                DocketError::not_found("department_grant", format!("{order_id}/{department_id}"))
            })?;

        let history = CreateOrderHistory {
            old_value: Some(serde_json::to_value(previous.capabilities)?),
            new_value: Some(serde_json::to_value(input.capabilities)?),
            ..entry(
                ctx,
                order_id,
                HistoryAction::DepartmentAccessUpdated,
                format!("Access updated for department {department_id}"),
            )
        };
        let saved = self
            .resolver
            .department_grants
            .replace(
                CreateDepartmentGrant {
                    order_id,
                    department_id,
                    capabilities: input.capabilities,
                    granted_by: ctx.actor_id,
                    expires_at: input.expires_at,
                    notes: input.notes,
                },
                history,
            )
            .await?;

        info!(order_id = %order_id, department_id = %department_id, "Department access updated");
        Ok(saved)
    }

    pub async fn revoke_department_access(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        department_id: Uuid,
    ) -> DocketResult<()> {
        self.load_mutable(order_id, ctx).await?;

        let previous = self
            .resolver
            .department_grants
            .get(order_id, department_id)
            .await?
            .ok_or_else(|| {
                DocketError::not_found("department_grant", format!("{order_id}/{department_id}"))
            })?;

        let history = CreateOrderHistory {
            old_value: Some(serde_json::to_value(previous.capabilities)?),
            ..entry(
                ctx,
                order_id,
                HistoryAction::DepartmentAccessRevoked,
                format!("Access revoked for department {department_id}"),
            )
        };
        self.resolver
            .department_grants
            .delete(order_id, department_id, history)
            .await?;

        info!(order_id = %order_id, department_id = %department_id, "Department access revoked");
        Ok(())
    }

    pub async fn get_order_department_accesses(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
    ) -> DocketResult<Vec<DepartmentGrant>> {
        self.load_managed(order_id, ctx, VIEW_PERMISSIONS).await?;
        self.resolver.department_grants.list_by_order(order_id).await
    }

    // -----------------------------------------------------------------------
    // User exceptions
    // -----------------------------------------------------------------------

    /// Block department-derived access for one user. An existing exception
    /// for the pair is replaced rather than duplicated.
    pub async fn add_user_exception(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        input: UserExceptionInput,
    ) -> DocketResult<UserException> {
        let order = self.load_mutable(order_id, ctx).await?;
        ensure_future(input.expires_at)?;
        self.ensure_grantee(&order, input.user_id).await?;

        let exception = CreateUserException {
            order_id,
            user_id: input.user_id,
            created_by: ctx.actor_id,
            expires_at: input.expires_at,
            reason: input.reason,
        };
        let history = CreateOrderHistory {
            new_value: Some(json!({
                "user_id": exception.user_id,
                "expires_at": exception.expires_at,
                "reason": exception.reason,
            })),
            ..entry(
                ctx,
                order_id,
                HistoryAction::ExceptionAdded,
                format!("Exception added for user {}", exception.user_id),
            )
        };

        let exceptions = &self.resolver.exceptions;
        let saved = if exceptions.get(order_id, input.user_id).await?.is_some() {
            exceptions.replace(exception, history).await?
        } else {
            match exceptions.create(exception.clone(), history.clone()).await {
                Err(DocketError::AlreadyExists { .. }) => {
                    warn!(
                        order_id = %order_id,
                        user_id = %exception.user_id,
                        "Concurrent exception detected, retrying as update"
                    );
                    exceptions.replace(exception, history).await?
                }
                other => other?,
            }
        };

        info!(order_id = %order_id, user_id = %saved.user_id, "User exception added");
        Ok(saved)
    }

    pub async fn remove_user_exception(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> DocketResult<()> {
        self.load_mutable(order_id, ctx).await?;

        let previous = self
            .resolver
            .exceptions
            .get(order_id, user_id)
            .await?
            .ok_or_else(|| {
                DocketError::not_found("user_exception", format!("{order_id}/{user_id}"))
            })?;

        let history = CreateOrderHistory {
            old_value: Some(json!({
                "user_id": previous.user_id,
                "expires_at": previous.expires_at,
                "reason": previous.reason,
            })),
            ..entry(
                ctx,
                order_id,
                HistoryAction::ExceptionRemoved,
                format!("Exception removed for user {user_id}"),
            )
        };
        self.resolver
            .exceptions
            .delete(order_id, user_id, history)
            .await?;

        info!(order_id = %order_id, user_id = %user_id, "User exception removed");
        Ok(())
    }

    pub async fn get_order_user_exceptions(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
    ) -> DocketResult<Vec<UserException>> {
        self.load_managed(order_id, ctx, VIEW_PERMISSIONS).await?;
        self.resolver.exceptions.list_by_order(order_id).await
    }
}
