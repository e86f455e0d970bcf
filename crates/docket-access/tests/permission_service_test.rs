//! Integration tests for the permission service using in-memory SurrealDB.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, Utc};
use docket_access::{
    GrantDepartmentAccess, GrantUserPermission, PermissionResolver, PermissionService,
    UpdateDepartmentAccess, UpdateUserPermission, UserExceptionInput,
};
use docket_core::context::RequestContext;
use docket_core::error::{DocketError, DocketResult};
use docket_core::models::capability::{Capabilities, DepartmentCapabilities};
use docket_core::models::grant::{CreateUserGrant, UserGrant};
use docket_core::models::history::{CreateOrderHistory, HistoryAction};
use docket_core::models::order::{CreateOrder, Order};
use docket_core::repository::{HistoryRepository, OrderRepository, Pagination, UserGrantRepository};
use docket_db::repository::{
    SurrealDepartmentGrantRepository, SurrealDirectoryRepository, SurrealHistoryRepository,
    SurrealOrderRepository, SurrealUserExceptionRepository, SurrealUserGrantRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

type Service<G = SurrealUserGrantRepository<Db>> = PermissionService<
    SurrealOrderRepository<Db>,
    G,
    SurrealDepartmentGrantRepository<Db>,
    SurrealUserExceptionRepository<Db>,
    SurrealDirectoryRepository<Db>,
>;

struct Fixture {
    db: Surreal<Db>,
    directory: SurrealDirectoryRepository<Db>,
    owner: Uuid,
    order: Order,
}

async fn setup(is_public: bool) -> Fixture {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    docket_db::run_migrations(&db).await.unwrap();

    let directory = SurrealDirectoryRepository::new(db.clone());
    let owner = directory.create_user("Owner", false).await.unwrap().id;
    let order = SurrealOrderRepository::new(db.clone())
        .create(CreateOrder {
            reference_number: "ORD-42".into(),
            title: "Order 42".into(),
            order_type: "Internal".into(),
            status: "Open".into(),
            priority: "Normal".into(),
            department_id: Uuid::new_v4(),
            department_name: "D5".into(),
            subject_id: None,
            subject_name: None,
            created_by: owner,
            is_public,
            expiration_date: None,
        })
        .await
        .unwrap();

    Fixture {
        db,
        directory,
        owner,
        order,
    }
}

fn service_with<G: UserGrantRepository>(db: &Surreal<Db>, user_grants: G) -> Service<G> {
    PermissionService::new(PermissionResolver::new(
        SurrealOrderRepository::new(db.clone()),
        user_grants,
        SurrealDepartmentGrantRepository::new(db.clone()),
        SurrealUserExceptionRepository::new(db.clone()),
        SurrealDirectoryRepository::new(db.clone()),
    ))
}

fn service(db: &Surreal<Db>) -> Service {
    service_with(db, SurrealUserGrantRepository::new(db.clone()))
}

fn grant(user_id: Uuid, capabilities: Capabilities) -> GrantUserPermission {
    GrantUserPermission {
        user_id,
        capabilities,
        expires_at: None,
        notes: None,
    }
}

async fn history_actions(db: &Surreal<Db>, order_id: Uuid) -> Vec<HistoryAction> {
    SurrealHistoryRepository::new(db.clone())
        .list_by_order(order_id, Pagination::default())
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|h| h.action)
        .collect()
}

#[tokio::test]
async fn order_42_scenario_through_the_stores() {
    let fx = setup(false).await;
    let service = service(&fx.db);
    let owner = RequestContext::user(fx.owner);
    let u2 = fx.directory.create_user("U2", false).await.unwrap().id;
    let d5 = fx.directory.create_department("D5").await.unwrap().id;
    fx.directory.add_member(u2, d5).await.unwrap();

    service
        .grant_department_access(
            fx.order.id,
            &owner,
            GrantDepartmentAccess {
                department_id: d5,
                capabilities: DepartmentCapabilities {
                    view: true,
                    ..Default::default()
                },
                expires_at: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    let perms = service.get_effective_permissions(fx.order.id, u2).await.unwrap();
    assert_eq!(perms.capabilities(), Capabilities::view_only());

    service
        .add_user_exception(
            fx.order.id,
            &owner,
            UserExceptionInput {
                user_id: u2,
                expires_at: None,
                reason: Some("conflict of interest".into()),
            },
        )
        .await
        .unwrap();
    let perms = service.get_effective_permissions(fx.order.id, u2).await.unwrap();
    assert_eq!(perms.capabilities(), Capabilities::none());

    service
        .grant_user_permission(
            fx.order.id,
            &owner,
            grant(
                u2,
                Capabilities {
                    view: true,
                    download: true,
                    ..Default::default()
                },
            ),
        )
        .await
        .unwrap();
    let perms = service.get_effective_permissions(fx.order.id, u2).await.unwrap();
    assert!(perms.can_view && perms.can_download);
    assert!(!perms.can_edit && !perms.is_owner);

    assert_eq!(
        history_actions(&fx.db, fx.order.id).await,
        vec![
            HistoryAction::PermissionGranted,
            HistoryAction::ExceptionAdded,
            HistoryAction::DepartmentAccessGranted,
        ]
    );
}

#[tokio::test]
async fn owner_resolves_to_everything() {
    let fx = setup(false).await;
    let perms = service(&fx.db)
        .get_effective_permissions(fx.order.id, fx.owner)
        .await
        .unwrap();
    assert!(perms.is_owner);
    assert_eq!(perms.capabilities(), Capabilities::ALL);
}

#[tokio::test]
async fn missing_order_is_not_found() {
    let fx = setup(false).await;
    let err = service(&fx.db)
        .get_effective_permissions(Uuid::new_v4(), fx.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::NotFound { .. }));
}

#[tokio::test]
async fn public_order_is_view_only_for_strangers() {
    let fx = setup(true).await;
    let stranger = fx.directory.create_user("Stranger", false).await.unwrap().id;
    let perms = service(&fx.db)
        .get_effective_permissions(fx.order.id, stranger)
        .await
        .unwrap();
    assert_eq!(perms.capabilities(), Capabilities::view_only());
}

#[tokio::test]
async fn grant_twice_replaces_in_place() {
    let fx = setup(false).await;
    let service = service(&fx.db);
    let owner = RequestContext::user(fx.owner);
    let user = fx.directory.create_user("Reader", false).await.unwrap().id;

    let first = service
        .grant_user_permission(fx.order.id, &owner, grant(user, Capabilities::view_only()))
        .await
        .unwrap();
    let second = service
        .grant_user_permission(fx.order.id, &owner, grant(user, Capabilities::ALL))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.capabilities, Capabilities::ALL);

    let grants = service
        .get_order_user_permissions(fx.order.id, &owner)
        .await
        .unwrap();
    assert_eq!(grants.len(), 1);

    let rows = SurrealHistoryRepository::new(fx.db.clone())
        .list_by_order(fx.order.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(rows.total, 2);
    assert_eq!(
        rows.items[0].old_value,
        Some(serde_json::to_value(Capabilities::view_only()).unwrap())
    );
}

#[tokio::test]
async fn update_and_revoke_write_history() {
    let fx = setup(false).await;
    let service = service(&fx.db);
    let admin = RequestContext::admin(Uuid::new_v4());
    let user = fx.directory.create_user("Editor", false).await.unwrap().id;

    service
        .grant_user_permission(fx.order.id, &admin, grant(user, Capabilities::view_only()))
        .await
        .unwrap();
    let updated = service
        .update_user_permission(
            fx.order.id,
            &admin,
            user,
            UpdateUserPermission {
                capabilities: Capabilities {
                    view: true,
                    edit: true,
                    ..Default::default()
                },
                expires_at: Some(Utc::now() + Duration::days(30)),
                notes: Some("temporary".into()),
            },
        )
        .await
        .unwrap();
    assert!(updated.capabilities.edit);
    assert!(updated.expires_at.is_some());

    service
        .revoke_user_permission(fx.order.id, &admin, user)
        .await
        .unwrap();
    assert!(
        service
            .get_order_user_permissions(fx.order.id, &admin)
            .await
            .unwrap()
            .is_empty()
    );

    let err = service
        .revoke_user_permission(fx.order.id, &admin, user)
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::NotFound { .. }));

    assert_eq!(
        history_actions(&fx.db, fx.order.id).await,
        vec![
            HistoryAction::PermissionRevoked,
            HistoryAction::PermissionUpdated,
            HistoryAction::PermissionGranted,
        ]
    );
}

#[tokio::test]
async fn non_owner_is_forbidden_even_with_grants() {
    let fx = setup(false).await;
    let service = service(&fx.db);
    let owner = RequestContext::user(fx.owner);
    let editor = fx.directory.create_user("Editor", false).await.unwrap().id;
    let other = fx.directory.create_user("Other", false).await.unwrap().id;

    service
        .grant_user_permission(fx.order.id, &owner, grant(editor, Capabilities::ALL))
        .await
        .unwrap();

    let caller = RequestContext::user(editor);
    let err = service
        .grant_user_permission(fx.order.id, &caller, grant(other, Capabilities::view_only()))
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::Forbidden { .. }), "{err:?}");

    let err = service
        .get_order_department_accesses(fx.order.id, &caller)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    assert_eq!(history_actions(&fx.db, fx.order.id).await.len(), 1);
}

#[tokio::test]
async fn invalid_grants_are_rejected() {
    let fx = setup(false).await;
    let service = service(&fx.db);
    let owner = RequestContext::user(fx.owner);
    let user = fx.directory.create_user("Reader", false).await.unwrap().id;

    let cases = [
        grant(user, Capabilities::none()),
        grant(Uuid::new_v4(), Capabilities::view_only()),
        grant(fx.owner, Capabilities::view_only()),
        GrantUserPermission {
            expires_at: Some(Utc::now() - Duration::hours(1)),
            ..grant(user, Capabilities::view_only())
        },
    ];
    for input in cases {
        let err = service
            .grant_user_permission(fx.order.id, &owner, input)
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::Validation { .. }), "{err:?}");
    }

    let err = service
        .grant_department_access(
            fx.order.id,
            &owner,
            GrantDepartmentAccess {
                department_id: Uuid::new_v4(),
                capabilities: DepartmentCapabilities {
                    view: true,
                    ..Default::default()
                },
                expires_at: None,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::Validation { .. }));

    assert!(history_actions(&fx.db, fx.order.id).await.is_empty());
}

#[tokio::test]
async fn exception_replaces_existing_one() {
    let fx = setup(false).await;
    let service = service(&fx.db);
    let owner = RequestContext::user(fx.owner);
    let user = fx.directory.create_user("Blocked", false).await.unwrap().id;

    for reason in ["first", "second"] {
        service
            .add_user_exception(
                fx.order.id,
                &owner,
                UserExceptionInput {
                    user_id: user,
                    expires_at: None,
                    reason: Some(reason.into()),
                },
            )
            .await
            .unwrap();
    }

    let exceptions = service
        .get_order_user_exceptions(fx.order.id, &owner)
        .await
        .unwrap();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].reason.as_deref(), Some("second"));

    service
        .remove_user_exception(fx.order.id, &owner, user)
        .await
        .unwrap();
    assert!(
        service
            .get_order_user_exceptions(fx.order.id, &owner)
            .await
            .unwrap()
            .is_empty()
    );
}

/// Hides existing grants from the first lookup, as if a concurrent writer
/// committed between the read and the insert.
struct StaleFirstRead {
    inner: SurrealUserGrantRepository<Db>,
    stale: AtomicBool,
}

impl UserGrantRepository for StaleFirstRead {
    async fn get(&self, order_id: Uuid, user_id: Uuid) -> DocketResult<Option<UserGrant>> {
        if self.stale.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get(order_id, user_id).await
    }

    async fn list_by_order(&self, order_id: Uuid) -> DocketResult<Vec<UserGrant>> {
        self.inner.list_by_order(order_id).await
    }

    async fn create(
        &self,
        input: CreateUserGrant,
        history: CreateOrderHistory,
    ) -> DocketResult<UserGrant> {
        self.inner.create(input, history).await
    }

    async fn replace(
        &self,
        input: CreateUserGrant,
        history: CreateOrderHistory,
    ) -> DocketResult<UserGrant> {
        self.inner.replace(input, history).await
    }

    async fn delete(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        history: CreateOrderHistory,
    ) -> DocketResult<()> {
        self.inner.delete(order_id, user_id, history).await
    }
}

#[tokio::test]
async fn lost_insert_race_is_retried_as_update() {
    let fx = setup(false).await;
    let owner = RequestContext::user(fx.owner);
    let user = fx.directory.create_user("Racer", false).await.unwrap().id;

    service(&fx.db)
        .grant_user_permission(fx.order.id, &owner, grant(user, Capabilities::view_only()))
        .await
        .unwrap();

    // The gate resolves the owner without touching the grant store, so the
    // first lookup is the one made by grant_user_permission.
    let racing = service_with(
        &fx.db,
        StaleFirstRead {
            inner: SurrealUserGrantRepository::new(fx.db.clone()),
            stale: AtomicBool::new(true),
        },
    );

    let saved = racing
        .grant_user_permission(fx.order.id, &owner, grant(user, Capabilities::ALL))
        .await
        .unwrap();
    assert_eq!(saved.capabilities, Capabilities::ALL);

    let stored = SurrealUserGrantRepository::new(fx.db.clone())
        .list_by_order(fx.order.id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        history_actions(&fx.db, fx.order.id).await,
        vec![HistoryAction::PermissionGranted, HistoryAction::PermissionGranted]
    );
}

#[tokio::test]
async fn archived_order_rejects_grant_changes() {
    let fx = setup(false).await;
    let service = service(&fx.db);
    let user = fx.directory.create_user("Late", false).await.unwrap().id;

    fx.db
        .query("UPDATE type::record('orders', $id) SET is_archived = true, archived_at = time::now()")
        .bind(("id", fx.order.id.to_string()))
        .await
        .unwrap();

    let err = service
        .grant_user_permission(
            fx.order.id,
            &RequestContext::user(fx.owner),
            grant(user, Capabilities::view_only()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::BusinessRule { .. }), "{err:?}");
}

#[tokio::test]
async fn department_access_lifecycle() {
    let fx = setup(false).await;
    let service = service(&fx.db);
    let owner = RequestContext::user(fx.owner);
    let member = fx.directory.create_user("Clerk", false).await.unwrap().id;
    let dept = fx.directory.create_department("Archive desk").await.unwrap().id;
    fx.directory.add_member(member, dept).await.unwrap();

    service
        .grant_department_access(
            fx.order.id,
            &owner,
            GrantDepartmentAccess {
                department_id: dept,
                capabilities: DepartmentCapabilities {
                    view: true,
                    ..Default::default()
                },
                expires_at: None,
                notes: None,
            },
        )
        .await
        .unwrap();

    let updated = service
        .update_department_access(
            fx.order.id,
            &owner,
            dept,
            UpdateDepartmentAccess {
                capabilities: DepartmentCapabilities {
                    view: true,
                    download: true,
                    ..Default::default()
                },
                expires_at: None,
                notes: Some("needs copies".into()),
            },
        )
        .await
        .unwrap();
    assert!(updated.capabilities.download);
    let perms = service
        .get_effective_permissions(fx.order.id, member)
        .await
        .unwrap();
    assert!(perms.can_view && perms.can_download);

    service
        .revoke_department_access(fx.order.id, &owner, dept)
        .await
        .unwrap();
    let perms = service
        .get_effective_permissions(fx.order.id, member)
        .await
        .unwrap();
    assert!(!perms.can_view);

    let err = service
        .revoke_department_access(fx.order.id, &owner, dept)
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::NotFound { .. }));

    assert_eq!(
        history_actions(&fx.db, fx.order.id).await,
        vec![
            HistoryAction::DepartmentAccessRevoked,
            HistoryAction::DepartmentAccessUpdated,
            HistoryAction::DepartmentAccessGranted,
        ]
    );
}
