//! End-to-end OAuth flow: authorize, exchange, refresh, and the failure
//! modes around each.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bridge_service::models::Role;
use common::*;

async fn authorize_and_get_code(app: &TestApp, email: &str, password: &str) -> String {
    let form = serde_urlencoded::to_string([
        ("client_id", TEST_CLIENT_ID),
        ("redirect_uri", TEST_REDIRECT_URI),
        ("response_type", "code"),
        ("state", "abc123"),
        ("email", email),
        ("password", password),
    ])
    .unwrap();

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/oauth/authorize")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(location.starts_with(TEST_REDIRECT_URI));
    assert!(location.contains("state=abc123"));

    location
        .split("code=")
        .nth(1)
        .and_then(|s| s.split('&').next())
        .unwrap()
        .to_string()
}

async fn exchange(app: &TestApp, code: &str, secret: &str) -> axum::http::Response<Body> {
    let form = serde_urlencoded::to_string([
        ("grant_type", "authorization_code"),
        ("client_id", TEST_CLIENT_ID),
        ("client_secret", secret),
        ("code", code),
        ("redirect_uri", TEST_REDIRECT_URI),
    ])
    .unwrap();

    app.request(
        Request::builder()
            .method("POST")
            .uri("/oauth/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap(),
    )
    .await
}

async fn refresh(app: &TestApp, refresh_token: &str) -> axum::http::Response<Body> {
    let form = serde_urlencoded::to_string([
        ("grant_type", "refresh_token"),
        ("client_id", TEST_CLIENT_ID),
        ("client_secret", TEST_CLIENT_SECRET),
        ("refresh_token", refresh_token),
    ])
    .unwrap();

    app.request(
        Request::builder()
            .method("POST")
            .uri("/oauth/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn full_flow_yields_usable_tokens() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let (access, refresh_token) = obtain_tokens(&app, "alice@example.com", "hunter2hunter2").await;
    assert!(!access.is_empty());
    assert!(!refresh_token.is_empty());
    assert_ne!(access, refresh_token);

    let user = app
        .state
        .oauth
        .validate_access_token(&access)
        .await
        .unwrap()
        .expect("Access token should validate");
    assert_eq!(user.email, "alice@example.com");
}

#[tokio::test]
async fn wrong_password_rerenders_login_form() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let form = serde_urlencoded::to_string([
        ("client_id", TEST_CLIENT_ID),
        ("redirect_uri", TEST_REDIRECT_URI),
        ("response_type", "code"),
        ("email", "alice@example.com"),
        ("password", "wrong"),
    ])
    .unwrap();

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/oauth/authorize")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8_lossy(&bytes);
    assert!(html.contains("Invalid email or password"));
}

#[tokio::test]
async fn authorize_rejects_unknown_client_and_response_type() {
    let db = setup_db().await;
    let app = build_app(db).await;

    let response = app
        .request(
            Request::builder()
                .uri("/oauth/authorize?client_id=wrong&redirect_uri=x&response_type=code")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Request::builder()
                .uri(format!(
                    "/oauth/authorize?client_id={TEST_CLIENT_ID}&redirect_uri=x&response_type=token"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn state_with_reserved_characters_survives_the_redirect() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let csrf_state = "abc&next=/evil def";
    let form = serde_urlencoded::to_string([
        ("client_id", TEST_CLIENT_ID),
        ("redirect_uri", TEST_REDIRECT_URI),
        ("response_type", "code"),
        ("state", csrf_state),
        ("email", "alice@example.com"),
        ("password", "hunter2hunter2"),
    ])
    .unwrap();

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/oauth/authorize")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    let query = location.split_once('?').map(|(_, q)| q).unwrap();
    let params: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap();

    assert!(params
        .iter()
        .any(|(k, v)| k == "state" && v == csrf_state));
    // The state value must not be able to forge extra parameters.
    assert!(!params.iter().any(|(k, _)| k == "next"));
}

#[tokio::test]
async fn code_is_single_use() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let code = authorize_and_get_code(&app, "alice@example.com", "hunter2hunter2").await;

    let first = exchange(&app, &code, TEST_CLIENT_SECRET).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = exchange(&app, &code, TEST_CLIENT_SECRET).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = body_json(second).await;
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn concurrent_exchanges_have_exactly_one_winner() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let code = authorize_and_get_code(&app, "alice@example.com", "hunter2hunter2").await;

    let (first, second) = tokio::join!(
        exchange(&app, &code, TEST_CLIENT_SECRET),
        exchange(&app, &code, TEST_CLIENT_SECRET)
    );

    let statuses = [first.status(), second.status()];
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::OK).count(),
        1,
        "exactly one exchange must win: {statuses:?}"
    );
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::BAD_REQUEST)
            .count(),
        1
    );
}

#[tokio::test]
async fn expired_code_is_invalid_grant() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let code = authorize_and_get_code(&app, "alice@example.com", "hunter2hunter2").await;

    // Shift the ten-minute expiry back past T+11min.
    sqlx::query("UPDATE oauth_authorization_codes SET expires_at = expires_at - 660")
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let response = exchange(&app, &code, TEST_CLIENT_SECRET).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn failed_exchange_leaves_the_code_unconsumed() {
    let db = setup_db().await;
    let user = create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let code = authorize_and_get_code(&app, "alice@example.com", "hunter2hunter2").await;

    // Disable the owner between authorize and exchange.
    app.state
        .oauth
        .set_user_status(&user.id, bridge_service::models::UserStatus::Disabled)
        .await
        .unwrap();

    let response = exchange(&app, &code, TEST_CLIENT_SECRET).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_grant");

    // No half-minted pair.
    let pairs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM oauth_tokens")
        .fetch_one(app.state.db.pool())
        .await
        .unwrap();
    assert_eq!(pairs, 0);

    // The failed attempt rolled back entirely: once the account is active
    // again, the same code still completes.
    app.state
        .oauth
        .set_user_status(&user.id, bridge_service::models::UserStatus::Active)
        .await
        .unwrap();
    let response = exchange(&app, &code, TEST_CLIENT_SECRET).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_client_secret_is_invalid_client() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let code = authorize_and_get_code(&app, "alice@example.com", "hunter2hunter2").await;

    let response = exchange(&app, &code, "not-the-secret").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_client");
}

#[tokio::test]
async fn unsupported_grant_type_is_rejected() {
    let db = setup_db().await;
    let app = build_app(db).await;

    let form = serde_urlencoded::to_string([
        ("grant_type", "password"),
        ("client_id", TEST_CLIENT_ID),
        ("client_secret", TEST_CLIENT_SECRET),
    ])
    .unwrap();

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/oauth/token")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn refresh_rotates_and_invalidates_the_old_pair() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let (old_access, old_refresh) =
        obtain_tokens(&app, "alice@example.com", "hunter2hunter2").await;

    let response = refresh(&app, &old_refresh).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let new_access = body["access_token"].as_str().unwrap();
    assert_ne!(new_access, old_access);

    // The old pair is fully revoked.
    let old_user = app
        .state
        .oauth
        .validate_access_token(&old_access)
        .await
        .unwrap();
    assert!(old_user.is_none());

    let replay = refresh(&app, &old_refresh).await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    let body = body_json(replay).await;
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn access_token_expires_after_its_ttl() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let (access, _) = obtain_tokens(&app, "alice@example.com", "hunter2hunter2").await;
    assert!(app
        .state
        .oauth
        .validate_access_token(&access)
        .await
        .unwrap()
        .is_some());

    // Shift the one-hour expiry just into the past.
    sqlx::query("UPDATE oauth_tokens SET expires_at = expires_at - 3601")
        .execute(app.state.db.pool())
        .await
        .unwrap();

    assert!(app
        .state
        .oauth
        .validate_access_token(&access)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn refresh_outside_the_thirty_day_window_is_invalid_grant() {
    let db = setup_db().await;
    create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let (_, refresh_token) = obtain_tokens(&app, "alice@example.com", "hunter2hunter2").await;

    // Age the pair past the thirty-day refresh window.
    sqlx::query("UPDATE oauth_tokens SET created_at = created_at - 2678400")
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let response = refresh(&app, &refresh_token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn seeded_admin_can_log_in() {
    let db = setup_db().await;

    let seeded = db
        .seed_admin_user("admin@example.com", "Admin", "correct-horse-battery")
        .await
        .unwrap()
        .expect("first seed must create the account");
    assert_eq!(seeded.role, Role::Admin);

    // Re-running the seed is a no-op and does not clobber the password.
    let again = db
        .seed_admin_user("admin@example.com", "Admin", "other-password")
        .await
        .unwrap();
    assert!(again.is_none());

    let app = build_app(db).await;
    let (access, _) = obtain_tokens(&app, "admin@example.com", "correct-horse-battery").await;
    assert!(!access.is_empty());
}

#[tokio::test]
async fn disabling_a_user_kills_their_tokens() {
    let db = setup_db().await;
    let user = create_user(&db, "alice@example.com", "hunter2hunter2", Role::Member).await;
    let app = build_app(db).await;

    let (access, _) = obtain_tokens(&app, "alice@example.com", "hunter2hunter2").await;
    assert!(app
        .state
        .oauth
        .validate_access_token(&access)
        .await
        .unwrap()
        .is_some());

    app.state
        .oauth
        .set_user_status(&user.id, bridge_service::models::UserStatus::Disabled)
        .await
        .unwrap();

    assert!(app
        .state
        .oauth
        .validate_access_token(&access)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn metadata_advertises_endpoints() {
    let db = setup_db().await;
    let app = build_app(db).await;

    let response = app
        .request(
            Request::builder()
                .uri("/.well-known/oauth-authorization-server")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["issuer"], "http://localhost:3847");
    assert_eq!(
        body["authorization_endpoint"],
        "http://localhost:3847/oauth/authorize"
    );
    assert_eq!(body["token_endpoint"], "http://localhost:3847/oauth/token");
    assert_eq!(body["grant_types_supported"][1], "refresh_token");
}
