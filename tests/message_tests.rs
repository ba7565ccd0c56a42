mod common;

use std::sync::Arc;

use account_portal::{
    MockStorageService, create_router,
    models::{BulkUpdateResponse, Message, MessageInbox},
};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use common::{InMemoryRepo, message, state_with, user};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

// --- Helpers ---

fn app(repo: Arc<InMemoryRepo>) -> Router {
    create_router(state_with(repo, MockStorageService::new()))
}

fn send_as(method: &str, path: &str, user_id: Uuid) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("x-user-id", user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

fn json_as(method: &str, path: &str, user_id: Uuid, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("Content-Type", "application/json")
        .header("x-user-id", user_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// An admin plus a small inbox: two unread (one high priority system notice),
/// one read and one archived.
fn inbox() -> (Arc<InMemoryRepo>, Uuid, Vec<Message>) {
    let admin = user(Some("admin"), true);
    let admin_id = admin.id;
    let messages = vec![
        message("Server maintenance", "unread", "high", "system"),
        message("Welcome aboard", "unread", "normal", "admin"),
        message("Billing question", "read", "low", "user"),
        message("Old report", "archived", "normal", "admin"),
    ];
    let repo = InMemoryRepo::with_users(vec![admin]).with_messages(messages.clone());
    (Arc::new(repo), admin_id, messages)
}

async fn list(repo: &Arc<InMemoryRepo>, admin_id: Uuid, query: &str) -> Response {
    app(repo.clone())
        .oneshot(send_as("GET", &format!("/admin/messages{query}"), admin_id))
        .await
        .unwrap()
}

// --- Listing ---

#[tokio::test]
async fn test_inbox_lists_messages_with_counters() {
    let (repo, admin_id, _) = inbox();

    let response = list(&repo, admin_id, "").await;
    assert_eq!(response.status(), StatusCode::OK);

    let inbox: MessageInbox = body_json(response).await;
    assert_eq!(inbox.messages.len(), 4);
    assert_eq!(inbox.pagination.total, 4);
    assert_eq!(inbox.pagination.page, 1);
    assert_eq!(inbox.stats.total, 4);
    assert_eq!(inbox.stats.unread, 2);
    assert_eq!(inbox.stats.high_priority, 1);
    assert_eq!(inbox.stats.system, 1);
}

#[tokio::test]
async fn test_inbox_filters_narrow_the_listing_but_not_the_counters() {
    let (repo, admin_id, _) = inbox();

    let inbox: MessageInbox = body_json(list(&repo, admin_id, "?status=unread").await).await;
    assert_eq!(inbox.messages.len(), 2);
    assert!(inbox.messages.iter().all(|m| m.status == "unread"));
    assert_eq!(inbox.stats.total, 4);

    let inbox: MessageInbox =
        body_json(list(&repo, admin_id, "?status=unread&type=system").await).await;
    assert_eq!(inbox.messages.len(), 1);
    assert_eq!(inbox.messages[0].subject, "Server maintenance");

    let inbox: MessageInbox =
        body_json(list(&repo, admin_id, "?status=all&priority=all&type=all").await).await;
    assert_eq!(inbox.messages.len(), 4);

    let inbox: MessageInbox = body_json(list(&repo, admin_id, "?search=BILLING").await).await;
    assert_eq!(inbox.messages.len(), 1);
    assert_eq!(inbox.messages[0].subject, "Billing question");
}

#[tokio::test]
async fn test_inbox_rejects_unknown_filter_values() {
    let (repo, admin_id, _) = inbox();

    for query in ["?status=starred", "?priority=urgent", "?type=robot"] {
        let response = list(&repo, admin_id, query).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "query {query}");
    }
}

#[tokio::test]
async fn test_inbox_rejects_out_of_range_page() {
    let (repo, admin_id, _) = inbox();

    let response = list(&repo, admin_id, &format!("?page={}", i64::MAX)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inbox_is_admin_only() {
    let (repo, _, _) = inbox();
    let member = user(Some("user"), true);
    let member_id = member.id;
    repo.users.lock().unwrap().insert(member_id, member);

    let response = list(&repo, member_id, "").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/account"
    );
}

// --- Details ---

#[tokio::test]
async fn test_message_details() {
    let (repo, admin_id, messages) = inbox();
    let target = &messages[2];

    let response = app(repo.clone())
        .oneshot(send_as("GET", &format!("/admin/messages/{}", target.id), admin_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let details: Message = body_json(response).await;
    assert_eq!(details.id, target.id);
    assert_eq!(details.subject, "Billing question");
    assert_eq!(details.message_type, "user");

    let response = app(repo)
        .oneshot(send_as("GET", &format!("/admin/messages/{}", Uuid::new_v4()), admin_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Creation ---

#[tokio::test]
async fn test_admin_sends_message_to_user() {
    let (repo, admin_id, _) = inbox();
    let recipient = user(Some("user"), true);
    let recipient_id = recipient.id;
    let recipient_email = recipient.email.clone();
    repo.users.lock().unwrap().insert(recipient_id, recipient);
    let admin_name = repo.user(admin_id).unwrap().name;

    let body = json!({
        "subject": "  Account review ",
        "content": "Please confirm your details.",
        "recipient_id": recipient_id,
        "priority": "high",
    });
    let response = app(repo.clone())
        .oneshot(json_as("POST", "/admin/messages", admin_id, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let created: Message = body_json(response).await;
    assert_eq!(created.subject, "Account review");
    assert_eq!(created.sender, admin_name);
    assert_eq!(created.status, "unread");
    assert_eq!(created.priority, "high");
    assert_eq!(created.message_type, "admin");
    assert_eq!(created.recipient_email.as_deref(), Some(recipient_email.as_str()));

    let inbox: MessageInbox = body_json(list(&repo, admin_id, "").await).await;
    assert_eq!(inbox.stats.total, 5);
    assert_eq!(inbox.stats.unread, 3);
}

#[tokio::test]
async fn test_blank_admin_name_sends_as_admin() {
    let mut admin = user(Some("admin"), true);
    admin.name = "   ".to_string();
    let admin_id = admin.id;
    let repo = Arc::new(InMemoryRepo::with_users(vec![admin]));

    let body = json!({ "subject": "Notice", "content": "Hello", "type": "system" });
    let response = app(repo)
        .oneshot(json_as("POST", "/admin/messages", admin_id, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let created: Message = body_json(response).await;
    assert_eq!(created.sender, "Admin");
    assert_eq!(created.message_type, "system");
    assert_eq!(created.priority, "normal");
}

#[tokio::test]
async fn test_create_message_validates_input() {
    let (repo, admin_id, _) = inbox();

    let invalid = [
        json!({ "subject": " ", "content": "body" }),
        json!({ "subject": "Subject", "content": "" }),
        json!({ "subject": "Subject", "content": "body", "recipient_id": Uuid::new_v4() }),
    ];
    for body in invalid {
        let response = app(repo.clone())
            .oneshot(json_as("POST", "/admin/messages", admin_id, body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
    }
    assert_eq!(repo.messages.lock().unwrap().len(), 4);
}

// --- Status changes ---

#[tokio::test]
async fn test_single_message_status_changes() {
    let (repo, admin_id, messages) = inbox();
    let id = messages[0].id;

    for (action, expected) in [("read", "read"), ("unread", "unread"), ("archive", "archived")] {
        let response = app(repo.clone())
            .oneshot(send_as("POST", &format!("/admin/messages/{id}/{action}"), admin_id))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "action {action}");
        assert_eq!(repo.stored_message(id).unwrap().0.status, expected);
    }

    let response = app(repo)
        .oneshot(send_as(
            "POST",
            &format!("/admin/messages/{}/read", Uuid::new_v4()),
            admin_id,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleted_message_is_hidden_but_kept() {
    let (repo, admin_id, messages) = inbox();
    let id = messages[1].id;
    let path = format!("/admin/messages/{id}");

    let response = app(repo.clone())
        .oneshot(send_as("DELETE", &path, admin_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, deleted) = repo.stored_message(id).unwrap();
    assert!(deleted);

    let inbox: MessageInbox = body_json(list(&repo, admin_id, "").await).await;
    assert_eq!(inbox.messages.len(), 3);
    assert!(inbox.messages.iter().all(|m| m.id != id));
    assert_eq!(inbox.stats.total, 3);
    assert_eq!(inbox.stats.unread, 1);

    let response = app(repo.clone())
        .oneshot(send_as("GET", &path, admin_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A deleted message cannot be revived through a status change.
    let response = app(repo)
        .oneshot(send_as("POST", &format!("{path}/read"), admin_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Bulk ---

#[tokio::test]
async fn test_bulk_update_reports_changed_count() {
    let (repo, admin_id, messages) = inbox();
    let ids: Vec<Uuid> = messages[..2].iter().map(|m| m.id).collect();

    let body = json!({ "ids": [ids[0], ids[1], Uuid::new_v4()], "action": "read" });
    let response = app(repo.clone())
        .oneshot(json_as("POST", "/admin/messages/bulk", admin_id, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result: BulkUpdateResponse = body_json(response).await;
    assert_eq!(result.updated, 2);
    for id in &ids {
        assert_eq!(repo.stored_message(*id).unwrap().0.status, "read");
    }

    let body = json!({ "ids": ids, "action": "delete" });
    let response = app(repo.clone())
        .oneshot(json_as("POST", "/admin/messages/bulk", admin_id, body))
        .await
        .unwrap();
    let result: BulkUpdateResponse = body_json(response).await;
    assert_eq!(result.updated, 2);

    let inbox: MessageInbox = body_json(list(&repo, admin_id, "").await).await;
    assert_eq!(inbox.stats.total, 2);
}

#[tokio::test]
async fn test_bulk_update_requires_ids() {
    let (repo, admin_id, _) = inbox();

    let body = json!({ "ids": [], "action": "archive" });
    let response = app(repo)
        .oneshot(json_as("POST", "/admin/messages/bulk", admin_id, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
