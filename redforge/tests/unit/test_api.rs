//! HTTP API tests against the router

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use redforge::server::auth::{Claims, Role};
use redforge::server::serve::router;
use redforge::server::state::ServerState;

use crate::common::Harness;

const SECRET: &str = "router-test-secret";

fn app(h: &Harness) -> Router {
    router(Arc::new(ServerState::new(
        h.store.clone(),
        h.orchestrator.clone(),
        SecretString::from(SECRET.to_string()),
    )))
}

fn token(role: Role) -> String {
    let claims = Claims {
        sub: "u-7".into(),
        name: "operator".into(),
        role,
        exp: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn request(method: Method, uri: &str, role: Option<Role>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(role) = role {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(role)));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

#[tokio::test]
async fn test_health_is_public() {
    let h = Harness::new();
    let (status, body) = send(&app(&h), request(Method::GET, "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "redforge");
}

#[tokio::test]
async fn test_missing_or_forged_token_is_unauthorized() {
    let h = Harness::new();
    let app = app(&h);

    let (status, _) = send(&app, request(Method::GET, "/deployments", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = Request::builder()
        .uri("/deployments")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_roles_gate_mutations() {
    let h = Harness::new();
    let app = app(&h);

    let (status, _) = send(
        &app,
        request(Method::GET, "/deployments", Some(Role::ReadOnly), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/deployments",
            Some(Role::ReadOnly),
            Some(json!({"name": "op"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let integration = json!({"name": "do", "platform": "digitalocean", "secretKey": "dop_v1"});
    let (status, _) = send(
        &app,
        request(Method::POST, "/integrations", Some(Role::Operator), Some(integration.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request(Method::POST, "/integrations", Some(Role::Admin), Some(integration)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.get("secretKey").is_none());
}

#[tokio::test]
async fn test_validation_errors_name_the_field() {
    let h = Harness::new();
    let (status, body) = send(
        &app(&h),
        request(
            Method::POST,
            "/deployments",
            Some(Role::Operator),
            Some(json!({"name": "op", "sshKeyId": "k"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("platformId"));
}

#[tokio::test]
async fn test_trigger_destroy_then_delete() {
    let h = Harness::new();
    let deployment = h.deployment().await;
    let app = app(&h);
    let uri = format!("/deployments/{}", deployment.id);

    let (status, _) = send(&app, request(Method::DELETE, &uri, Some(Role::Operator), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        request(Method::POST, &format!("{}/destroy", uri), Some(Role::Operator), None),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["message"].as_str().unwrap().contains(&deployment.id));

    let (status, body) = send(&app, request(Method::GET, &uri, Some(Role::ReadOnly), None)).await;
    assert_eq!(status, StatusCode::OK);
    let reported = body["status"].as_str().unwrap().to_string();
    assert!(reported == "destroying" || reported == "destroyed");

    let (status, _) = send(
        &app,
        request(Method::POST, &format!("{}/destroy", uri), Some(Role::Operator), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let logs = h.store.read(|t| t.logs.all()).await;
    assert!(logs
        .iter()
        .any(|l| l.message == format!("User u-7 (operator) destroyed the deployment {} (op-nightfall)", deployment.id)));
}

#[tokio::test]
async fn test_unknown_deployment_is_not_found() {
    let h = Harness::new();
    let (status, _) = send(
        &app(&h),
        request(Method::POST, "/deployments/nope/prepare", Some(Role::Operator), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
