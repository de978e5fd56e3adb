use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use livekit_api::access_token::TokenVerifier;
use serde_json::{json, Value};
use tower::ServiceExt;

use vconnect_core::TokenClient;
use vconnect_server::{build_router, AppState, Credentials, StaticCredentials, TokenIssuer};

const API_KEY: &str = "devkey";
const API_SECRET: &str = "a-sufficiently-long-test-secret-value";

fn credentials() -> Credentials {
    Credentials {
        url: "https://video.example.test".to_string(),
        api_key: API_KEY.to_string(),
        api_secret: API_SECRET.to_string(),
    }
}

fn app(credentials: Option<Credentials>) -> Router {
    let issuer = TokenIssuer::new(Arc::new(StaticCredentials(credentials)));
    build_router(AppState::new(issuer))
}

async fn post_token(app: Router, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn issues_token_for_room() {
    let (status, body) =
        post_token(app(Some(credentials())), r#"{"identity":"alice","roomName":"8f3c1a9d"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "wss://video.example.test");
    let token = body["token"].as_str().unwrap();
    assert!(!token.is_empty());

    let claims = TokenVerifier::with_api_key(API_KEY, API_SECRET)
        .verify(token)
        .unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.video.room, "8f3c1a9d");
    assert!(claims.video.room_join);

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as usize;
    assert!(claims.exp > now);
    assert!(claims.exp <= now + 6 * 60 * 60 + 5);
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    for body in [
        r#"{"identity":"alice"}"#,
        r#"{"roomName":"8f3c1a9d"}"#,
        r#"{"identity":"","roomName":"8f3c1a9d"}"#,
        r#"{"identity":"alice","roomName":"  "}"#,
        r#"{}"#,
    ] {
        let (status, body) = post_token(app(Some(credentials())), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Identity and room name are required" }));
    }
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    for body in ["not json", r#"{"identity":42,"roomName":"r"}"#, "[]"] {
        let (status, body) = post_token(app(Some(credentials())), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("token").is_none());
    }
}

#[tokio::test]
async fn missing_credentials_fail_every_request() {
    for body in [r#"{"identity":"alice","roomName":"8f3c1a9d"}"#, r#"{}"#, "not json"] {
        let (status, body) = post_token(app(None), body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "error": "Server configuration error: Missing credentials" })
        );
    }
}

#[tokio::test]
async fn api_routes_allow_cross_origin_calls() {
    let response = app(Some(credentials()))
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/token")
                .header(header::ORIGIN, "https://elsewhere.example")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"identity":"alice","roomName":"r"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let preflight = app(Some(credentials()))
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/token")
                .header(header::ORIGIN, "https://elsewhere.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    let methods = preflight.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .to_string();
    for method in ["GET", "POST", "OPTIONS"] {
        assert!(methods.contains(method), "{methods}");
    }
    let headers = preflight.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(headers.contains("content-type"));
}

#[tokio::test]
async fn pages_are_not_cross_origin() {
    let response = app(None)
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::ORIGIN, "https://elsewhere.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn room_routes() {
    let response = app(None)
        .oneshot(
            Request::builder()
                .uri("/join?username=alice&roomName=8f3c1a9d")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers()[header::LOCATION],
        "/room/8f3c1a9d?username=alice"
    );

    let response = app(None)
        .oneshot(
            Request::builder()
                .uri("/room/8f3c1a9d?username=alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&html).contains("8f3c1a9d"));

    let response = app(None)
        .oneshot(Request::builder().uri("/api/room-id").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["roomId"].as_str().unwrap().len(), 8);
}

#[tokio::test]
async fn token_client_round_trip() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(Some(credentials()))).await.unwrap();
    });

    let client = TokenClient::new(format!("http://{addr}"));
    let info = client.request_token("alice", "8f3c1a9d").await.unwrap();
    assert_eq!(info.url, "wss://video.example.test");
    let claims = TokenVerifier::with_api_key(API_KEY, API_SECRET)
        .verify(&info.token)
        .unwrap();
    assert_eq!(claims.video.room, "8f3c1a9d");

    let err = client.request_token("", "8f3c1a9d").await.unwrap_err();
    assert_eq!(
        err,
        vconnect_core::SessionError::Auth("Identity and room name are required".to_string())
    );
}
