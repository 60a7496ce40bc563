//! HTTP-level tests for the `/auth` router.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{ADMIN_PASSWORD, DOCTOR_PASSWORD, Harness, config, harness, harness_with};
use medrec_auth::{AuthState, auth_router};

const CLIENT_PEER: &str = "192.0.2.10:40312";

fn router(h: &Harness) -> Router {
    auth_router(AuthState::new(h.service.clone()))
}

fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    from_peer(request, CLIENT_PEER)
}

fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    request
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> Response {
    app.clone()
        .oneshot(post_json(
            "/auth/login",
            json!({ "username": username, "password": password }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn login_returns_camel_case_pair() {
    let h = harness();
    h.doctor().await;
    let app = router(&h);

    let response = login(&app, "dr.house", DOCTOR_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert!(body["accessToken"].is_string());
    assert_eq!(body["refreshToken"].as_str().unwrap().len(), 128);
    assert_eq!(body["expiresIn"], 900);
    assert_eq!(body["user"]["username"], "dr.house");
    assert_eq!(body["user"]["roles"], json!(["Doctor"]));
}

#[tokio::test]
async fn failed_login_shapes_match() {
    let h = harness();
    h.doctor().await;
    let app = router(&h);

    let ghost = login(&app, "ghost", "Wrong-Guess-Again-1").await;
    let known = login(&app, "dr.house", "Wrong-Guess-Again-1").await;
    assert_eq!(ghost.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(known.status(), StatusCode::UNAUTHORIZED);
    assert!(ghost.headers().contains_key(header::WWW_AUTHENTICATE));

    let ghost = json_body(ghost).await;
    let known = json_body(known).await;
    assert_eq!(ghost, known);
    assert_eq!(known["remainingAttempts"], 4);
}

#[tokio::test]
async fn lockout_responds_423_with_unlock_at() {
    let h = harness();
    h.doctor().await;
    let app = router(&h);

    for _ in 0..5 {
        let response = login(&app, "dr.house", "Wrong-Guess-Again-1").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = login(&app, "dr.house", DOCTOR_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::LOCKED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "account_locked");
    assert!(body["unlockAt"].is_string());
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let h = harness();
    let app = router(&h);

    let response = app
        .clone()
        .oneshot(post_json("/auth/login", json!({ "username": "x" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json("/auth/refresh", json!({ "token": "x" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unusable_refresh_tokens_are_unauthorized() {
    let h = harness();
    let app = router(&h);

    for token in ["not-a-valid-token".to_string(), "0".repeat(128)] {
        let response = app
            .clone()
            .oneshot(post_json("/auth/refresh", json!({ "refreshToken": token })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(json_body(response).await["error"], "invalid_credentials");
    }
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_escape_lockout() {
    let h = harness();
    h.doctor().await;
    let app = router(&h);

    let mut statuses = Vec::new();
    for i in 0..12 {
        let mut request = post_json(
            "/auth/login",
            json!({ "username": "dr.house", "password": "Wrong-Guess-Again-1" }),
        );
        request.headers_mut().insert(
            "x-forwarded-for",
            format!("198.51.100.{i}").parse().unwrap(),
        );
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }
    assert!(statuses[..5].iter().all(|s| *s == StatusCode::UNAUTHORIZED));
    assert!(statuses[5..].iter().all(|s| *s == StatusCode::LOCKED));

    let response = login(&app, "dr.house", DOCTOR_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn trusted_proxy_forwards_client_origin() {
    let mut cfg = config(Duration::ZERO);
    cfg.trusted_proxies = vec!["10.0.0.2".parse().unwrap()];
    let h = harness_with(&cfg);
    h.doctor().await;
    let app = router(&h);

    let mut request = from_peer(
        post_json(
            "/auth/login",
            json!({ "username": "dr.house", "password": DOCTOR_PASSWORD }),
        ),
        "10.0.0.2:443",
    );
    request.headers_mut().insert(
        "x-forwarded-for",
        "203.0.113.50, 198.51.100.7".parse().unwrap(),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let access = json_body(response).await["accessToken"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(get("/auth/sessions", Some(&access)))
        .await
        .unwrap();
    let sessions = json_body(response).await;
    assert_eq!(sessions[0]["origin"], "198.51.100.7");
}

#[tokio::test]
async fn me_requires_valid_bearer() {
    let h = harness();
    h.doctor().await;
    let app = router(&h);

    let response = app.clone().oneshot(get("/auth/me", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get("/auth/me", Some("not.a.jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let pair = json_body(login(&app, "dr.house", DOCTOR_PASSWORD).await).await;
    let token = pair["accessToken"].as_str().unwrap();
    let response = app.oneshot(get("/auth/me", Some(token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = json_body(response).await;
    assert_eq!(me["email"], "house@princeton-plainsboro.org");
}

#[tokio::test]
async fn logout_then_refresh_is_unauthorized() {
    let h = harness();
    h.doctor().await;
    let app = router(&h);

    let pair = json_body(login(&app, "dr.house", DOCTOR_PASSWORD).await).await;
    let access = pair["accessToken"].as_str().unwrap();
    let refresh = pair["refreshToken"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(with_bearer(
            post_json("/auth/logout", json!({ "allDevices": false })),
            access,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(post_json("/auth/refresh", json!({ "refreshToken": refresh })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_accepts_empty_body() {
    let h = harness();
    h.doctor().await;
    let app = router(&h);

    let pair = json_body(login(&app, "dr.house", DOCTOR_PASSWORD).await).await;
    let access = pair["accessToken"].as_str().unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_revocation_requires_permission() {
    let h = harness();
    let doctor = h.doctor().await;
    h.admin().await;
    let app = router(&h);

    let doctor_pair = json_body(login(&app, "dr.house", DOCTOR_PASSWORD).await).await;
    let doctor_access = doctor_pair["accessToken"].as_str().unwrap();
    let uri = format!("/auth/users/{}/sessions/revoke", doctor.id);

    let response = app
        .clone()
        .oneshot(post_json(&uri, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(with_bearer(post_json(&uri, json!({})), doctor_access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "insufficient_permissions");
    assert!(!body.to_string().contains("sessions:revoke"));

    let admin_pair = json_body(login(&app, "admin", ADMIN_PASSWORD).await).await;
    let admin_access = admin_pair["accessToken"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(with_bearer(post_json(&uri, json!({})), admin_access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["revoked"], 1);

    let refresh = doctor_pair["refreshToken"].as_str().unwrap();
    let response = app
        .oneshot(post_json("/auth/refresh", json!({ "refreshToken": refresh })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sessions_endpoint_lists_origin() {
    let h = harness();
    h.doctor().await;
    let app = router(&h);

    let pair = json_body(login(&app, "dr.house", DOCTOR_PASSWORD).await).await;
    let access = pair["accessToken"].as_str().unwrap();

    let response = app
        .oneshot(get("/auth/sessions", Some(access)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let sessions = json_body(response).await;
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["origin"], "192.0.2.10");
    assert!(sessions[0].get("tokenHash").is_none());
}
