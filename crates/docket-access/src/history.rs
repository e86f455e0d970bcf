//! Order history queries, plus the builder every service uses for the
//! history row it writes alongside a mutation.

use docket_core::context::RequestContext;
use docket_core::error::DocketResult;
use docket_core::models::history::{CreateOrderHistory, HistoryAction, OrderHistory};
use docket_core::repository::{
    DepartmentGrantRepository, DirectoryRepository, HistoryRepository, OrderRepository,
    PaginatedResult, Pagination, UserExceptionRepository, UserGrantRepository,
};
use uuid::Uuid;

use crate::config::AccessConfig;
use crate::error::AccessError;
use crate::resolver::PermissionResolver;

/// A history row attributed to the caller, without old/new values.
pub(crate) fn entry(
    ctx: &RequestContext,
    order_id: Uuid,
    action: HistoryAction,
    description: impl Into<String>,
) -> CreateOrderHistory {
    CreateOrderHistory {
        order_id,
        action,
        old_value: None,
        new_value: None,
        description: description.into(),
        performed_by: ctx.actor_id,
        ip_address: ctx.ip_address.clone(),
        user_agent: ctx.user_agent.clone(),
        notes: None,
    }
}

/// Read access to the audit trail of one order.
pub struct HistoryService<O, G, D, E, R, H> {
    resolver: PermissionResolver<O, G, D, E, R>,
    history: H,
    config: AccessConfig,
}

impl<O, G, D, E, R, H> HistoryService<O, G, D, E, R, H>
where
    O: OrderRepository,
    G: UserGrantRepository,
    D: DepartmentGrantRepository,
    E: UserExceptionRepository,
    R: DirectoryRepository,
    H: HistoryRepository,
{
    pub fn new(resolver: PermissionResolver<O, G, D, E, R>, history: H, config: AccessConfig) -> Self {
        Self {
            resolver,
            history,
            config,
        }
    }

    /// History of `order_id`, newest first. The caller needs view access.
    pub async fn get_order_history(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        pagination: Pagination,
    ) -> DocketResult<PaginatedResult<OrderHistory>> {
        let order = self.resolver.orders.get_by_id(order_id).await?;
        let permissions = self.resolver.for_caller(&order, ctx).await?;
        if !permissions.can_view {
            return Err(AccessError::CannotView.into());
        }

        self.history
            .list_by_order(order_id, self.config.page(pagination))
            .await
    }
}
