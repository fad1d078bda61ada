//! Integration tests for the HTTP API surface.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::TestEngine;
use meridian_engine::api::router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_endpoint() {
    let setup = TestEngine::new();
    let app = router(setup.app_state());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn submit_and_fetch_round_trip() {
    let setup = TestEngine::new();
    let app = router(setup.app_state());

    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks",
            json!({"user_id": 1, "data_size": 1e8, "type": "inference"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_owned();
    assert_eq!(id.len(), 16);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["user_id"], 1);

    let response = app.oneshot(get(&format!("/tasks/{id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["id"], id.as_str());
}

#[tokio::test]
async fn submit_validation_maps_to_http_errors() {
    let setup = TestEngine::new();
    let app = router(setup.app_state());

    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks",
            json!({"user_id": 999, "data_size": 1e6}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(post_json("/tasks", json!({"user_id": 1, "data_size": 0.0})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let setup = TestEngine::new();
    let app = router(setup.app_state());

    let response = app
        .oneshot(get("/tasks/0123456789abcdef"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn task_paging() {
    let setup = TestEngine::new();
    for _ in 0..3 {
        setup.submit_paused(1, 1e8, None).await;
    }
    let app = router(setup.app_state());

    let response = app
        .clone()
        .oneshot(get("/tasks?offset=0&limit=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let page = body_json(response).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["tasks"].as_array().unwrap().len(), 2);

    let response = app
        .oneshot(get("/tasks?status=pending&user_id=1"))
        .await
        .unwrap();
    let filtered = body_json(response).await;
    assert_eq!(filtered["total"], 3);
}

#[tokio::test]
async fn cancel_twice_conflicts() {
    let setup = TestEngine::new();
    // Large payload: the loop cannot finish it before the cancel lands.
    let task = setup.submit_paused(1, 1e8, None).await;
    let app = router(setup.app_state());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/tasks/{}", task.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/tasks/{}", task.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn scheduler_mode_switch() {
    let setup = TestEngine::new();
    let app = router(setup.app_state());

    let response = app
        .clone()
        .oneshot(post_json("/system/mode", json!({"mode": "greedy"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/system"))
        .await
        .unwrap();
    let info = body_json(response).await;
    assert_eq!(info["scheduler"], "greedy");

    let response = app
        .oneshot(post_json("/system/mode", json!({"mode": "bogus"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn system_info_reports_counts() {
    let setup = TestEngine::new();
    setup.submit_paused(1, 1e8, None).await;
    let app = router(setup.app_state());

    let response = app.oneshot(get("/system")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let info = body_json(response).await;
    assert_eq!(info["user_count"], 1);
    assert_eq!(info["comm_count"], 1);
    assert_eq!(info["task_count"], 1);
    assert_eq!(info["active_tasks"], 1);
}

#[tokio::test]
async fn stop_and_clear_endpoints() {
    let setup = TestEngine::new();
    setup.submit_paused(1, 1e8, None).await;
    let app = router(setup.app_state());

    let response = app
        .clone()
        .oneshot(post_json("/system/stop", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .oneshot(post_json("/system/clear", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(setup.engine.current_slot(), 0);
}
