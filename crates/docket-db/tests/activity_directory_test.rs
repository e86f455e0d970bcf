//! Integration tests for the activity log, directory and attachment stores
//! using in-memory SurrealDB.

use docket_core::models::activity::CreateActivityLog;
use docket_core::models::attachment::CreateAttachment;
use docket_core::repository::{
    ActivityLogFilter, ActivityLogRepository, AttachmentRepository, DirectoryRepository,
    Pagination,
};
use docket_db::repository::{
    SurrealActivityLogRepository, SurrealAttachmentRepository, SurrealDirectoryRepository,
};
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    docket_db::run_migrations(&db).await.unwrap();
    db
}

fn entry(order_id: Option<Uuid>, actor_id: Uuid, is_success: bool) -> CreateActivityLog {
    CreateActivityLog {
        order_id,
        actor_id,
        controller: "OrderPermissions".into(),
        action: "GrantUserPermission".into(),
        http_method: "POST".into(),
        path: "/orders/permissions".into(),
        is_success,
        status_code: if is_success { 200 } else { 403 },
        error_message: (!is_success).then(|| "forbidden".into()),
        payload: json!({ "user_id": "u-1" }),
        ip_address: Some("192.168.1.7".into()),
        user_agent: Some("integration-test".into()),
    }
}

#[tokio::test]
async fn activity_rows_are_appended_and_filtered() {
    let db = setup().await;
    let repo = SurrealActivityLogRepository::new(db);
    let order_id = Uuid::new_v4();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let first = repo.append(entry(Some(order_id), alice, true)).await.unwrap();
    assert_eq!(first.status_code, 200);
    assert_eq!(first.payload, json!({ "user_id": "u-1" }));
    repo.append(entry(Some(order_id), bob, false)).await.unwrap();
    repo.append(entry(None, alice, true)).await.unwrap();

    let for_order = repo
        .list(
            ActivityLogFilter {
                order_id: Some(order_id),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(for_order.total, 2);

    let failures = repo
        .list(
            ActivityLogFilter {
                is_success: Some(false),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(failures.total, 1);
    let failure = &failures.items[0];
    assert_eq!(failure.actor_id, bob);
    assert_eq!(failure.status_code, 403);
    assert_eq!(failure.error_message.as_deref(), Some("forbidden"));

    let by_alice = repo
        .list(
            ActivityLogFilter {
                actor_id: Some(alice),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_alice.total, 2);
    assert!(by_alice.items[0].order_id.is_none(), "newest first");
}

#[tokio::test]
async fn scalar_payload_is_stored_as_object() {
    let db = setup().await;
    let repo = SurrealActivityLogRepository::new(db);

    let mut input = entry(None, Uuid::new_v4(), true);
    input.payload = json!("raw");
    let row = repo.append(input).await.unwrap();
    assert_eq!(row.payload, json!({ "value": "raw" }));
}

#[tokio::test]
async fn directory_tracks_memberships() {
    let db = setup().await;
    let repo = SurrealDirectoryRepository::new(db);

    let admin = repo.create_user("Ada", true).await.unwrap();
    let user = repo.create_user("Ben", false).await.unwrap();
    let sales = repo.create_department("Sales").await.unwrap();
    let legal = repo.create_department("Legal").await.unwrap();

    assert!(repo.user_exists(user.id).await.unwrap());
    assert!(!repo.user_exists(Uuid::new_v4()).await.unwrap());
    assert!(repo.department_exists(sales.id).await.unwrap());
    assert!(repo.is_admin(admin.id).await.unwrap());
    assert!(!repo.is_admin(user.id).await.unwrap());

    repo.add_member(user.id, sales.id).await.unwrap();
    repo.add_member(user.id, legal.id).await.unwrap();
    repo.add_member(user.id, legal.id).await.unwrap();

    let mut memberships = repo.department_memberships(user.id).await.unwrap();
    memberships.sort();
    let mut expected = vec![sales.id, legal.id];
    expected.sort();
    assert_eq!(memberships, expected);

    repo.remove_member(user.id, sales.id).await.unwrap();
    assert_eq!(
        repo.department_memberships(user.id).await.unwrap(),
        vec![legal.id]
    );
}

#[tokio::test]
async fn add_member_requires_known_user() {
    let db = setup().await;
    let repo = SurrealDirectoryRepository::new(db);
    let sales = repo.create_department("Sales").await.unwrap();

    let err = repo.add_member(Uuid::new_v4(), sales.id).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn attachments_are_listed_per_order() {
    let db = setup().await;
    let repo = SurrealAttachmentRepository::new(db);
    let order_id = Uuid::new_v4();

    repo.create(CreateAttachment {
        order_id,
        file_name: "invoice.pdf".into(),
        content_type: "application/pdf".into(),
        size_bytes: 2048,
    })
    .await
    .unwrap();
    repo.create(CreateAttachment {
        order_id: Uuid::new_v4(),
        file_name: "other.txt".into(),
        content_type: "text/plain".into(),
        size_bytes: 3,
    })
    .await
    .unwrap();

    let attachments = repo.list_for_order(order_id).await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].file_name, "invoice.pdf");
    assert_eq!(attachments[0].size_bytes, 2048);
}
