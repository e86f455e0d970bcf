//! Expiration and archive lifecycle.
//!
//! ```text
//! Active --(expiry reached, or owner/admin archives)--> Archived
//! Active --(owner/admin sets or clears expiry)--------> Active
//! Archived --(owner/admin restores, restorable)-------> Active
//! Archived --(admin purges snapshot)------------------> Purged
//! ```
//!
//! Detecting expired orders is a query; archiving is always an explicit
//! call.

use chrono::{DateTime, Duration, Utc};
use docket_core::context::RequestContext;
use docket_core::error::{DocketError, DocketResult};
use docket_core::models::archive::{
    ArchiveOrder, ArchivedOrder, ArchivedOrderFilter, OrderGraph, RestoreOrder,
};
use docket_core::models::grant::OrderGrants;
use docket_core::models::history::{CreateOrderHistory, HistoryAction};
use docket_core::models::order::Order;
use docket_core::repository::{
    ArchiveRepository, AttachmentRepository, DepartmentGrantRepository, DirectoryRepository,
    OrderRepository, PaginatedResult, Pagination, UserExceptionRepository, UserGrantRepository,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AccessConfig, ArchiveGrantPolicy};
use crate::error::AccessError;
use crate::history::entry;
use crate::resolver::PermissionResolver;

const MANUAL_ARCHIVE_REASON: &str = "Archived manually";
const EXPIRED_ARCHIVE_REASON: &str = "Expired";

/// Hex-encoded SHA-256 of a serialized snapshot.
pub fn payload_digest(serialized: &str) -> String {
    hex::encode(Sha256::digest(serialized.as_bytes()))
}

/// Expiration and archive service.
pub struct LifecycleService<O, G, D, E, R, A, T> {
    resolver: PermissionResolver<O, G, D, E, R>,
    archive: A,
    attachments: T,
    config: AccessConfig,
}

impl<O, G, D, E, R, A, T> LifecycleService<O, G, D, E, R, A, T>
where
    O: OrderRepository,
    G: UserGrantRepository,
    D: DepartmentGrantRepository,
    E: UserExceptionRepository,
    R: DirectoryRepository,
    A: ArchiveRepository,
    T: AttachmentRepository,
{
    pub fn new(
        resolver: PermissionResolver<O, G, D, E, R>,
        archive: A,
        attachments: T,
        config: AccessConfig,
    ) -> Self {
        Self {
            resolver,
            archive,
            attachments,
            config,
        }
    }

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

    // -----------------------------------------------------------------------
    // Expiration
    // -----------------------------------------------------------------------

    pub async fn set_expiration_date(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        expiration_date: DateTime<Utc>,
    ) -> DocketResult<Order> {
        let order = self
            .load_managed(order_id, ctx, "change the expiration date")
            .await?;
        if order.is_archived {
            return Err(AccessError::OrderArchived.into());
        }

        let history = CreateOrderHistory {
            old_value: order
                .expiration_date
                .map(|date| json!({ "expiration_date": date })),
            new_value: Some(json!({ "expiration_date": expiration_date })),
            ..entry(
                ctx,
                order_id,
                HistoryAction::ExpirationSet,
                format!("Expiration date set to {}", expiration_date.to_rfc3339()),
            )
        };
        let updated = self
            .resolver
            .orders
            .set_expiration_date(order_id, Some(expiration_date), history)
            .await?;

        info!(order_id = %order_id, expiration_date = %expiration_date, "Expiration date set");
        Ok(updated)
    }

    pub async fn remove_expiration_date(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
    ) -> DocketResult<Order> {
        let order = self
            .load_managed(order_id, ctx, "change the expiration date")
            .await?;
        if order.is_archived {
            return Err(AccessError::OrderArchived.into());
        }

        let history = CreateOrderHistory {
            old_value: order
                .expiration_date
                .map(|date| json!({ "expiration_date": date })),
            ..entry(
                ctx,
                order_id,
                HistoryAction::ExpirationRemoved,
                "Expiration date removed",
            )
        };
        let updated = self
            .resolver
            .orders
            .set_expiration_date(order_id, None, history)
            .await?;

        info!(order_id = %order_id, "Expiration date removed");
        Ok(updated)
    }

    /// Non-archived orders whose expiration date has passed. Never
    /// archives anything.
    pub async fn get_expired_orders(&self) -> DocketResult<Vec<Order>> {
        self.resolver.orders.list_expired(Utc::now()).await
    }

    /// Non-archived orders expiring within `days_window` days (the
    /// configured default when `None`).
    pub async fn get_orders_near_expiration(
        &self,
        days_window: Option<u32>,
    ) -> DocketResult<Vec<Order>> {
        let days = days_window.unwrap_or(self.config.near_expiration_window_days);
        let max = self.config.max_near_expiration_window_days;
        if days == 0 || days > max {
            return Err(AccessError::InvalidWindow { days, max }.into());
        }

        let now = Utc::now();
        self.resolver
            .orders
            .list_expiring_between(now, now + Duration::days(i64::from(days)))
            .await
    }

    // -----------------------------------------------------------------------
    // Archive
    // -----------------------------------------------------------------------

    pub async fn archive_order(
        &self,
        order_id: Uuid,
        ctx: &RequestContext,
        reason: Option<String>,
    ) -> DocketResult<ArchivedOrder> {
        let order = self.load_managed(order_id, ctx, "archive this order").await?;
        if order.is_archived {
            return Err(AccessError::AlreadyArchived.into());
        }

        let reason = reason.unwrap_or_else(|| MANUAL_ARCHIVE_REASON.into());
        self.archive_loaded(order, ctx, reason).await
    }

    /// Snapshot `order` with its grants and attachment summary, then hand
    /// the whole change to the archive store as one transaction.
    async fn archive_loaded(
        &self,
        order: Order,
        ctx: &RequestContext,
        reason: String,
    ) -> DocketResult<ArchivedOrder> {
        let order_id = order.id;
        let grants = OrderGrants {
            user_grants: self.resolver.user_grants.list_by_order(order_id).await?,
            department_grants: self
                .resolver
                .department_grants
                .list_by_order(order_id)
                .await?,
            user_exceptions: self.resolver.exceptions.list_by_order(order_id).await?,
        };
        let attachments = self.attachments.list_for_order(order_id).await?;

        let graph = OrderGraph {
            order: order.clone(),
            grants,
        };
        let serialized_order_data = serde_json::to_string(&graph)?;
        let attachments_info = serde_json::to_string(&attachments)?;
        let digest = payload_digest(&serialized_order_data);
        let snapshot_id = Uuid::new_v4();

        let history = CreateOrderHistory {
            new_value: Some(json!({
                "archived_order_id": snapshot_id,
                "reason": reason,
                "grant_count": graph.grants.user_grants.len()
                    + graph.grants.department_grants.len()
                    + graph.grants.user_exceptions.len(),
                "attachment_count": attachments.len(),
            })),
            ..entry(
                ctx,
                order_id,
                HistoryAction::Archived,
                format!("Order archived: {reason}"),
            )
        };

        let archived = self
            .archive
            .archive(ArchiveOrder {
                snapshot_id,
                order,
                archived_by: ctx.actor_id,
                archived_at: Utc::now(),
                archive_reason: reason,
                serialized_order_data,
                attachments_info,
                payload_digest: digest,
                grants: graph.grants,
                history,
            })
            .await
            .map_err(|err| match err {
                // A concurrent archive already wrote this order's snapshot.
                DocketError::AlreadyExists { .. } => AccessError::AlreadyArchived.into(),
                other => other,
            })?;

        info!(
            order_id = %order_id,
            archived_order_id = %archived.id,
            actor_id = %ctx.actor_id,
            "Order archived"
        );
        Ok(archived)
    }

    /// Archive every expired order, each in its own transaction. A failure
    /// on one order is logged and skipped. Returns the number archived.
    pub async fn archive_expired_orders(&self, ctx: &RequestContext) -> DocketResult<usize> {
        if !ctx.is_admin {
            return Err(AccessError::AdminOnly {
                action: "archive expired orders in bulk",
            }
            .into());
        }

        let expired = self.get_expired_orders().await?;
        let candidates = expired.len();
        let mut archived = 0;
        for order in expired {
            let order_id = order.id;
            match self
                .archive_loaded(order, ctx, EXPIRED_ARCHIVE_REASON.into())
                .await
            {
                Ok(_) => archived += 1,
                Err(err) => {
                    warn!(order_id = %order_id, error = %err, "Failed to archive expired order");
                }
            }
        }

        info!(candidates, archived, "Expired order sweep finished");
        Ok(archived)
    }

    /// Admins see every snapshot; other callers see snapshots of the
    /// orders they own.
    pub async fn get_archived_orders(
        &self,
        ctx: &RequestContext,
        pagination: Pagination,
    ) -> DocketResult<PaginatedResult<ArchivedOrder>> {
        let filter = ArchivedOrderFilter {
            owner_id: (!ctx.is_admin).then_some(ctx.actor_id),
        };
        self.archive
            .list(filter, self.config.page(pagination))
            .await
    }

    /// Load a snapshot and check the caller against its live order.
    async fn load_snapshot(
        &self,
        archived_id: Uuid,
        ctx: &RequestContext,
        action: &'static str,
    ) -> DocketResult<(ArchivedOrder, Order)> {
        let snapshot = self.archive.get_by_id(archived_id).await?;
        let order = self.load_managed(snapshot.order_id, ctx, action).await?;
        Ok((snapshot, order))
    }

    pub async fn get_archived_order(
        &self,
        archived_id: Uuid,
        ctx: &RequestContext,
    ) -> DocketResult<ArchivedOrder> {
        let (snapshot, _) = self
            .load_snapshot(archived_id, ctx, "view this archived order")
            .await?;
        Ok(snapshot)
    }

    /// Unflag the order and, under [`ArchiveGrantPolicy::Preserve`],
    /// re-create the grants captured in the snapshot.
    pub async fn restore_archived_order(
        &self,
        archived_id: Uuid,
        ctx: &RequestContext,
    ) -> DocketResult<Order> {
        let (snapshot, order) = self
            .load_snapshot(archived_id, ctx, "restore this archived order")
            .await?;
        if !snapshot.can_be_restored {
            return Err(AccessError::NotRestorable.into());
        }
        if !order.is_archived {
            return Err(AccessError::NotArchived.into());
        }
        if payload_digest(&snapshot.serialized_order_data) != snapshot.payload_digest {
            warn!(archived_order_id = %archived_id, "Archived order digest mismatch");
            return Err(AccessError::DigestMismatch.into());
        }

        let graph: OrderGraph = serde_json::from_str(&snapshot.serialized_order_data)?;
        let grants = match self.config.archive_grant_policy {
            ArchiveGrantPolicy::Preserve => graph.grants,
            ArchiveGrantPolicy::Discard => OrderGrants::default(),
        };

        let history = CreateOrderHistory {
            old_value: Some(json!({
                "archived_order_id": snapshot.id,
                "archived_at": snapshot.archived_at,
                "archive_reason": snapshot.archive_reason,
            })),
            ..entry(ctx, order.id, HistoryAction::Restored, "Order restored from archive")
        };

        let restored = self
            .archive
            .restore(RestoreOrder {
                archived_order_id: snapshot.id,
                order_id: order.id,
                grants,
                history,
            })
            .await?;

        info!(
            order_id = %restored.id,
            archived_order_id = %archived_id,
            actor_id = %ctx.actor_id,
            "Order restored"
        );
        Ok(restored)
    }

    /// Remove a snapshot for good. Admin only, regardless of ownership.
    pub async fn permanently_delete_archived_order(
        &self,
        archived_id: Uuid,
        ctx: &RequestContext,
    ) -> DocketResult<()> {
        if !ctx.is_admin {
            return Err(AccessError::AdminOnly {
                action: "permanently delete archived orders",
            }
            .into());
        }

        let snapshot = self.archive.get_by_id(archived_id).await?;
        let history = CreateOrderHistory {
            old_value: Some(json!({
                "archived_order_id": snapshot.id,
                "reference_number": snapshot.reference_number,
                "archived_at": snapshot.archived_at,
            })),
            ..entry(
                ctx,
                snapshot.order_id,
                HistoryAction::PermanentlyDeleted,
                "Archived order permanently deleted",
            )
        };
        self.archive.purge(archived_id, history).await?;

        warn!(
            order_id = %snapshot.order_id,
            archived_order_id = %archived_id,
            actor_id = %ctx.actor_id,
            "Archived order permanently deleted"
        );
        Ok(())
    }
}
