use axum::{
    Router,
    body::{Body, to_bytes},
    extract::Request,
    http::{Method, StatusCode},
    middleware::{self, Next},
    routing::post,
};
use chrono::Utc;
use person_api::{
    auth::AuthUser,
    guard::{RoleGuard, authorize},
    models::{Person, Role},
};
use serde_json::{Value, json};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tower::ServiceExt;

fn person_with_role(role: &str) -> Person {
    let now = Utc::now();
    Person {
        id: 1,
        name: "Guarded".to_string(),
        email: "guarded@example.com".to_string(),
        password: "$argon2id$stub".to_string(),
        role: role.to_string(),
        gender: "female".to_string(),
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn test_admin_guard_permits_admin_only() {
    let guard = RoleGuard::new([Role::Admin]);

    assert!(guard.permits(Some(&person_with_role("admin"))));
    assert!(!guard.permits(Some(&person_with_role("user"))));
}

#[test]
fn test_member_guard_permits_every_role() {
    let guard = RoleGuard::new([Role::Admin, Role::User]);

    assert!(guard.permits(Some(&person_with_role("admin"))));
    assert!(guard.permits(Some(&person_with_role("user"))));
}

#[test]
fn test_guard_rejects_absent_user() {
    let guard = RoleGuard::new([Role::Admin, Role::User]);
    assert!(!guard.permits(None));
}

#[test]
fn test_guard_rejects_unknown_role() {
    let guard = RoleGuard::new([Role::Admin, Role::User]);
    assert!(!guard.permits(Some(&person_with_role("superuser"))));
    // Stored roles are lowercase; anything else is not on the list.
    assert!(!guard.permits(Some(&person_with_role("Admin"))));
}

#[test]
fn test_empty_guard_rejects_everyone() {
    let guard = RoleGuard::new(Vec::<Role>::new());
    assert!(!guard.permits(Some(&person_with_role("admin"))));
}

#[test]
fn test_guard_is_idempotent_and_shareable() {
    let guard = RoleGuard::new([Role::Admin]);
    let clone = guard.clone();
    let admin = person_with_role("admin");
    let user = person_with_role("user");

    for _ in 0..3 {
        assert!(guard.permits(Some(&admin)));
        assert!(!guard.permits(Some(&user)));
        assert_eq!(guard.permits(Some(&admin)), clone.permits(Some(&admin)));
    }
    assert_eq!(clone.permitted(), &[Role::Admin]);
}

// --- Middleware Tests ---

/// Router with one admin-only route whose handler records that it ran.
/// `user` is attached to the request the way the authentication layer would.
fn guarded_router(user: Option<Person>, reached: Arc<AtomicBool>) -> Router {
    let router = Router::new()
        .route(
            "/guarded",
            post(move || async move {
                reached.store(true, Ordering::SeqCst);
                "done"
            }),
        )
        .route_layer(middleware::from_fn_with_state(
            RoleGuard::new([Role::Admin]),
            authorize,
        ));

    match user {
        Some(person) => router.layer(middleware::from_fn(
            move |mut request: Request, next: Next| {
                let person = person.clone();
                async move {
                    request.extensions_mut().insert(AuthUser(person));
                    next.run(request).await
                }
            },
        )),
        None => router,
    }
}

async fn post_guarded(router: Router) -> (StatusCode, Value) {
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/guarded")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_authorize_without_user_is_forbidden_and_skips_handler() {
    let reached = Arc::new(AtomicBool::new(false));

    let (status, body) = post_guarded(guarded_router(None, reached.clone())).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body,
        json!({ "status": false, "code": 403, "payload": { "message": "Insufficient permission" } })
    );
    assert!(!reached.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_authorize_rejects_role_not_on_list() {
    let reached = Arc::new(AtomicBool::new(false));

    let (status, body) =
        post_guarded(guarded_router(Some(person_with_role("user")), reached.clone())).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["payload"]["message"], "Insufficient permission");
    assert!(!reached.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_authorize_passes_permitted_role_through() {
    let reached = Arc::new(AtomicBool::new(false));

    let (status, _) =
        post_guarded(guarded_router(Some(person_with_role("admin")), reached.clone())).await;

    assert_eq!(status, StatusCode::OK);
    assert!(reached.load(Ordering::SeqCst));
}
