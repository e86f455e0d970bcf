//! Integration tests for the grant and exception stores using in-memory
//! SurrealDB.

use chrono::{Duration, Utc};
use docket_core::error::DocketError;
use docket_core::models::capability::{Capabilities, DepartmentCapabilities};
use docket_core::models::grant::{CreateDepartmentGrant, CreateUserException, CreateUserGrant};
use docket_core::models::history::{CreateOrderHistory, HistoryAction};
use docket_core::repository::{
    DepartmentGrantRepository, HistoryRepository, Pagination, UserExceptionRepository,
    UserGrantRepository,
};
use docket_db::repository::{
    SurrealDepartmentGrantRepository, SurrealHistoryRepository, SurrealUserExceptionRepository,
    SurrealUserGrantRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    docket_db::run_migrations(&db).await.unwrap();
    db
}

fn history(order_id: Uuid, action: HistoryAction, actor: Uuid) -> CreateOrderHistory {
    CreateOrderHistory {
        order_id,
        action,
        old_value: None,
        new_value: None,
        description: action.as_str().into(),
        performed_by: actor,
        ip_address: None,
        user_agent: None,
        notes: None,
    }
}

fn user_grant(order_id: Uuid, user_id: Uuid, capabilities: Capabilities) -> CreateUserGrant {
    CreateUserGrant {
        order_id,
        user_id,
        capabilities,
        granted_by: Uuid::new_v4(),
        expires_at: None,
        notes: Some("initial".into()),
    }
}

#[tokio::test]
async fn user_grant_lifecycle_writes_one_history_row_per_mutation() {
    let db = setup().await;
    let grants = SurrealUserGrantRepository::new(db.clone());
    let history_repo = SurrealHistoryRepository::new(db);
    let (order_id, user_id, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let created = grants
        .create(
            user_grant(order_id, user_id, Capabilities::view_only()),
            history(order_id, HistoryAction::PermissionGranted, actor),
        )
        .await
        .unwrap();
    assert_eq!(created.capabilities, Capabilities::view_only());
    assert_eq!(created.notes.as_deref(), Some("initial"));

    let caps = Capabilities {
        view: true,
        edit: true,
        ..Default::default()
    };
    let replaced = grants
        .replace(
            CreateUserGrant {
                notes: None,
                ..user_grant(order_id, user_id, caps)
            },
            history(order_id, HistoryAction::PermissionUpdated, actor),
        )
        .await
        .unwrap();
    assert_eq!(replaced.id, created.id);
    assert_eq!(replaced.capabilities, caps);
    assert!(replaced.notes.is_none());

    grants
        .delete(
            order_id,
            user_id,
            history(order_id, HistoryAction::PermissionRevoked, actor),
        )
        .await
        .unwrap();
    assert!(grants.get(order_id, user_id).await.unwrap().is_none());

    let rows = history_repo
        .list_by_order(order_id, Pagination::default())
        .await
        .unwrap();
    let actions: Vec<HistoryAction> = rows.items.iter().map(|h| h.action).collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::PermissionRevoked,
            HistoryAction::PermissionUpdated,
            HistoryAction::PermissionGranted,
        ]
    );
}

#[tokio::test]
async fn duplicate_user_grant_is_already_exists_and_rolls_back_history() {
    let db = setup().await;
    let grants = SurrealUserGrantRepository::new(db.clone());
    let history_repo = SurrealHistoryRepository::new(db);
    let (order_id, user_id, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    grants
        .create(
            user_grant(order_id, user_id, Capabilities::view_only()),
            history(order_id, HistoryAction::PermissionGranted, actor),
        )
        .await
        .unwrap();

    let err = grants
        .create(
            user_grant(order_id, user_id, Capabilities::ALL),
            history(order_id, HistoryAction::PermissionGranted, actor),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::AlreadyExists { .. }), "{err:?}");

    let rows = history_repo
        .list_by_order(order_id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(rows.total, 1);
    let stored = grants.get(order_id, user_id).await.unwrap().unwrap();
    assert_eq!(stored.capabilities, Capabilities::view_only());
}

#[tokio::test]
async fn department_grants_are_filtered_by_membership() {
    let db = setup().await;
    let grants = SurrealDepartmentGrantRepository::new(db);
    let order_id = Uuid::new_v4();
    let (sales, legal, hr) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    for department_id in [sales, legal] {
        grants
            .create(
                CreateDepartmentGrant {
                    order_id,
                    department_id,
                    capabilities: DepartmentCapabilities {
                        view: true,
                        download: department_id == legal,
                        ..Default::default()
                    },
                    granted_by: Uuid::new_v4(),
                    expires_at: Some(Utc::now() + Duration::days(1)),
                    notes: None,
                },
                history(order_id, HistoryAction::DepartmentAccessGranted, Uuid::new_v4()),
            )
            .await
            .unwrap();
    }

    assert_eq!(grants.list_by_order(order_id).await.unwrap().len(), 2);
    assert!(
        grants
            .list_for_departments(order_id, &[])
            .await
            .unwrap()
            .is_empty()
    );

    let visible = grants
        .list_for_departments(order_id, &[legal, hr])
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].department_id, legal);
    assert!(visible[0].capabilities.download);
}

#[tokio::test]
async fn replacing_an_exception_reactivates_it() {
    let db = setup().await;
    let exceptions = SurrealUserExceptionRepository::new(db.clone());
    let (order_id, user_id, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let input = CreateUserException {
        order_id,
        user_id,
        created_by: actor,
        expires_at: None,
        reason: Some("conflict of interest".into()),
    };
    let created = exceptions
        .create(
            input.clone(),
            history(order_id, HistoryAction::ExceptionAdded, actor),
        )
        .await
        .unwrap();
    assert!(created.is_active);

    db.query("UPDATE user_exception SET is_active = false WHERE order_id = $order_id")
        .bind(("order_id", order_id.to_string()))
        .await
        .unwrap();

    let replaced = exceptions
        .replace(
            CreateUserException {
                reason: Some("still conflicted".into()),
                ..input
            },
            history(order_id, HistoryAction::ExceptionAdded, actor),
        )
        .await
        .unwrap();
    assert!(replaced.is_active);
    assert_eq!(replaced.reason.as_deref(), Some("still conflicted"));
    assert_eq!(exceptions.list_by_order(order_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn writes_to_a_missing_grant_leave_no_history() {
    let db = setup().await;
    let grants = SurrealUserGrantRepository::new(db.clone());
    let history_repo = SurrealHistoryRepository::new(db);
    let (order_id, user_id, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let err = grants
        .replace(
            user_grant(order_id, user_id, Capabilities::view_only()),
            history(order_id, HistoryAction::PermissionUpdated, actor),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::NotFound { .. }), "{err:?}");

    let err = grants
        .delete(
            order_id,
            user_id,
            history(order_id, HistoryAction::PermissionRevoked, actor),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::NotFound { .. }), "{err:?}");

    assert!(grants.get(order_id, user_id).await.unwrap().is_none());
    let rows = history_repo
        .list_by_order(order_id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(rows.total, 0);
}

#[tokio::test]
async fn writes_to_missing_department_grants_and_exceptions_leave_no_history() {
    let db = setup().await;
    let departments = SurrealDepartmentGrantRepository::new(db.clone());
    let exceptions = SurrealUserExceptionRepository::new(db.clone());
    let history_repo = SurrealHistoryRepository::new(db);
    let (order_id, actor) = (Uuid::new_v4(), Uuid::new_v4());
    let (department_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());

    let err = departments
        .replace(
            CreateDepartmentGrant {
                order_id,
                department_id,
                capabilities: DepartmentCapabilities {
                    view: true,
                    ..Default::default()
                },
                granted_by: actor,
                expires_at: None,
                notes: None,
            },
            history(order_id, HistoryAction::DepartmentAccessUpdated, actor),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::NotFound { .. }), "{err:?}");

    let err = departments
        .delete(
            order_id,
            department_id,
            history(order_id, HistoryAction::DepartmentAccessRevoked, actor),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::NotFound { .. }), "{err:?}");

    let err = exceptions
        .replace(
            CreateUserException {
                order_id,
                user_id,
                created_by: actor,
                expires_at: None,
                reason: None,
            },
            history(order_id, HistoryAction::ExceptionAdded, actor),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::NotFound { .. }), "{err:?}");

    let err = exceptions
        .delete(
            order_id,
            user_id,
            history(order_id, HistoryAction::ExceptionRemoved, actor),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::NotFound { .. }), "{err:?}");

    assert!(departments.list_by_order(order_id).await.unwrap().is_empty());
    assert!(exceptions.list_by_order(order_id).await.unwrap().is_empty());
    let rows = history_repo
        .list_by_order(order_id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(rows.total, 0);
}
