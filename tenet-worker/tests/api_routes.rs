//! HTTP surface tests driven through the router without a listener.

mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use common::{SlowGenerator, TestHarness, prose};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tenet_core::domain::job::JobStatus;
use tenet_worker::api::create_router;
use tower::ServiceExt;
use uuid::Uuid;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("handler should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body must be collected")
        .to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builder must not fail")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builder must not fail")
}

#[tokio::test]
async fn health_returns_ok() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn ready_once_the_store_answers() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());

    let (status, body) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ready"));
}

#[tokio::test]
async fn upload_trigger_report_and_question() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());

    let upload = Request::builder()
        .method("POST")
        .uri("/job?filename=lease.txt")
        .body(Body::from(prose(500)))
        .unwrap();
    let (status, accepted) = send(&app, upload).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["status"], json!("PENDING"));
    let job_id: Uuid = serde_json::from_value(accepted["job_id"].clone()).unwrap();

    let storage_path = harness.job(job_id).await.source.storage_path;
    assert!(harness.storage.contains(&storage_path));

    // Report is not available before processing
    let (status, _) = send(&app, get(&format!("/job/{}/report", job_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let trigger = json!({ "job_id": job_id, "storage_path": storage_path });
    let (status, ack) = send(&app, post_json("/internal/job/process", trigger.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["result"], json!("processed"));
    assert_eq!(ack["status"], json!("SUCCESS"));

    // Redelivery is acknowledged without reprocessing
    let (status, ack) = send(&app, post_json("/internal/job/process", trigger)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["result"], json!("ignored"));
    assert_eq!(harness.job(job_id).await.attempt_count, 1);

    let (status, view) = send(&app, get(&format!("/job/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], json!("SUCCESS"));
    assert_eq!(view["error_message"], Value::Null);

    let (status, report) = send(&app, get(&format!("/job/{}/report", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["job_id"], json!(job_id));
    assert_eq!(report["sections"]["risks"].as_array().map(Vec::len), Some(5));

    let (status, answer) = send(
        &app,
        post_json(
            &format!("/job/{}/question", job_id),
            json!({ "question": "When is rent due?" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer["grounded"], json!(true));
    assert_eq!(answer["citations"][0]["segment_index"], json!(0));
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());
    let missing = Uuid::new_v4();

    let (status, body) = send(&app, get(&format!("/job/{}", missing))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let trigger = json!({ "job_id": missing, "storage_path": format!("{}/x.pdf", missing) });
    let (status, _) = send(&app, post_json("/internal/job/process", trigger)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dropped_trigger_request_still_finishes_the_run() {
    let harness = TestHarness::with_generator(Arc::new(SlowGenerator::new(
        Duration::from_millis(100),
    )));
    let app = create_router(harness.app_state());
    let job = harness.submit("lease.txt", prose(600).as_bytes()).await;
    let trigger = json!({ "job_id": job.id, "storage_path": job.source.storage_path });

    // The caller gives up while generation is still in flight
    let request = app.clone().oneshot(post_json("/internal/job/process", trigger));
    let abandoned = tokio::time::timeout(Duration::from_millis(50), request).await;
    assert!(abandoned.is_err(), "run should outlast the caller");
    assert_eq!(harness.job(job.id).await.status, JobStatus::Processing);

    let deadline = Instant::now() + Duration::from_secs(5);
    let finished = loop {
        let current = harness.job(job.id).await;
        if current.status.is_terminal() {
            break current;
        }
        assert!(Instant::now() < deadline, "job stuck in {:?}", current.status);
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    assert_eq!(finished.status, JobStatus::Success);
    assert_eq!(finished.attempt_count, 1);
    assert!(harness.stores.reports.find_by_job(job.id).await.unwrap().is_some());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());

    let empty = Request::builder()
        .method("POST")
        .uri("/job?filename=lease.txt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, empty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Questions about a job that has not finished conflict with its state
    let job = harness.submit("lease.txt", prose(200).as_bytes()).await;
    let (status, _) = send(
        &app,
        post_json(
            &format!("/job/{}/question", job.id),
            json!({ "question": "Anything?" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        post_json(&format!("/job/{}/question", job.id), json!({ "question": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
