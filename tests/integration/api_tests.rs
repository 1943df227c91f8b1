//! API integration tests for uploads, the event stream and static files.
//!
//! Tests verify:
//! - Upload validation, naming and the JSON response shape
//! - Synchronous thumbnail generation and task queueing
//! - The `connected` frame and event forwarding on `/stream`
//! - Serving stored files under `/uploads`

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::ImageFormat;
use serde_json::{json, Value};
use tower::ServiceExt;

use portfolio_server::processing::WorkerMessage;
use portfolio_server::{create_router, RouterConfig};

use super::test_utils::{
    dimensions, encode_image, multipart_body, multipart_content_type, Part, TestEnv,
};

fn router(env: &TestEnv) -> Router {
    create_router(env.state(), RouterConfig::new().with_tracing(false))
}

fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let env = TestEnv::new();
    let response = router(&env)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

// =============================================================================
// Uploads
// =============================================================================

#[tokio::test]
async fn test_upload_image() {
    let mut env = TestEnv::new();
    let jpeg = encode_image(1200, 900, ImageFormat::Jpeg);

    let response = router(&env)
        .oneshot(upload_request(&[
            ("file", Some("x.jpg"), &jpeg[..]),
            ("kind", None, &b"snap"[..]),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({
            "ok": true,
            "url": "/uploads/x.jpg",
            "thumb": "/uploads/thumbs/x.jpg",
            "kind": "snap",
        })
    );

    // Stored, fast-enhanced within bounds, and thumbnailed before the response
    let stored = env.upload_path("x.jpg");
    assert_eq!(dimensions(&stored), (1200, 900));
    let (w, h) = dimensions(&env.layout.thumb_path(&stored));
    assert!(w <= 400 && h <= 300);

    match env.take_receiver().try_recv() {
        Ok(WorkerMessage::Process(task)) => {
            assert_eq!(task.name, "x.jpg");
            assert_eq!(task.kind, "snap");
            assert_eq!(task.path, stored);
        }
        other => panic!("expected a queued task, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_large_image_is_downscaled() {
    let env = TestEnv::new();
    let png = encode_image(2600, 1300, ImageFormat::Png);

    let response = router(&env)
        .oneshot(upload_request(&[("file", Some("wide.png"), &png[..])]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(dimensions(&env.upload_path("wide.png")), (2000, 1000));
}

#[tokio::test]
async fn test_upload_defaults_kind_to_cert() {
    let env = TestEnv::new();
    let png = encode_image(32, 32, ImageFormat::Png);

    let response = router(&env)
        .oneshot(upload_request(&[("file", Some("badge.png"), &png[..])]))
        .await
        .unwrap();

    assert_eq!(json_body(response).await["kind"], "cert");
}

#[tokio::test]
async fn test_upload_document_has_no_thumbnail() {
    let mut env = TestEnv::new();

    let response = router(&env)
        .oneshot(upload_request(&[
            ("file", Some("My Resume.pdf"), &b"%PDF-1.4 test"[..]),
            ("kind", None, &b"resume"[..]),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["url"], "/uploads/My_Resume.pdf");
    assert!(body.get("thumb").is_none());

    assert_eq!(
        std::fs::read(env.upload_path("My_Resume.pdf")).unwrap(),
        b"%PDF-1.4 test"
    );
    assert!(env.take_receiver().try_recv().is_err());
}

#[tokio::test]
async fn test_upload_name_collision() {
    let env = TestEnv::new();
    let png = encode_image(16, 16, ImageFormat::Png);
    let app = router(&env);

    let first = app
        .clone()
        .oneshot(upload_request(&[("file", Some("a.png"), &png[..])]))
        .await
        .unwrap();
    let second = app
        .oneshot(upload_request(&[("file", Some("a.png"), &png[..])]))
        .await
        .unwrap();

    assert_eq!(json_body(first).await["url"], "/uploads/a.png");
    let second = json_body(second).await;
    assert_eq!(second["url"], "/uploads/a-1.png");
    assert_eq!(second["thumb"], "/uploads/thumbs/a-1.png");
}

#[tokio::test]
async fn test_upload_corrupt_image_still_succeeds() {
    let env = TestEnv::new();

    let response = router(&env)
        .oneshot(upload_request(&[("file", Some("broken.jpg"), &b"not a jpeg"[..])]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        std::fs::read(env.upload_path("broken.jpg")).unwrap(),
        b"not a jpeg"
    );
    assert!(!env.layout.thumbs_dir().join("broken.jpg").exists());
}

#[tokio::test]
async fn test_upload_rejects_disallowed_extension() {
    let env = TestEnv::new();

    let response = router(&env)
        .oneshot(upload_request(&[("file", Some("tool.exe"), &b"MZ"[..])]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_file");
    assert!(!env.upload_path("tool.exe").exists());
}

#[tokio::test]
async fn test_upload_without_file() {
    let env = TestEnv::new();

    let response = router(&env)
        .oneshot(upload_request(&[("kind", None, &b"snap"[..])]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "missing_file");
}

#[tokio::test]
async fn test_uploaded_file_is_served() {
    let env = TestEnv::new();
    let png = encode_image(20, 10, ImageFormat::Png);
    let app = router(&env);

    let response = app
        .clone()
        .oneshot(upload_request(&[("file", Some("pic.png"), &png[..])]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for uri in ["/uploads/pic.png", "/uploads/thumbs/pic.png"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/uploads/missing.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Event Stream
// =============================================================================

/// Next event-stream frame, with `field: value` normalized to `field:value`.
async fn next_frame(body: &mut Body) -> String {
    let frame = body.frame().await.unwrap().unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    text.replace(": ", ":")
}

#[tokio::test]
async fn test_stream_connected_then_events() {
    let env = TestEnv::new();

    let response = router(&env)
        .oneshot(Request::builder().uri("/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(env.hub.subscriber_count(), 1);

    let mut body = response.into_body();

    let connected = next_frame(&mut body).await;
    assert!(connected.starts_with("event:connected\n"), "{}", connected);
    assert!(connected.contains("\"time\":"));
    assert!(connected.ends_with("\n\n"));

    env.hub.publish(
        "processed",
        json!({"kind": "snap", "name": "x.jpg", "url": "/uploads/x.jpg", "thumb": "/uploads/thumbs/x.jpg"}),
    );
    let processed = next_frame(&mut body).await;
    assert!(processed.starts_with("event:processed\n"), "{}", processed);
    assert!(processed.contains("\"name\":\"x.jpg\""));

    drop(body);
    assert_eq!(env.hub.subscriber_count(), 0);
}

#[tokio::test]
async fn test_stream_ends_when_hub_closes() {
    let env = TestEnv::new();

    let response = router(&env)
        .oneshot(Request::builder().uri("/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let mut body = response.into_body();
    next_frame(&mut body).await;

    env.hub.close();
    assert!(body.frame().await.is_none());
}
