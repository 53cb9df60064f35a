mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{Factory, TestApp};
use stagehand::queue::{LifecycleAction, LifecycleJob};

const REPO: &str = "git@github.com:acme/webshop.git";

async fn seed_job(app: &TestApp, action: LifecycleAction, environment: &str) -> Uuid {
    let job = LifecycleJob::new(action, environment);
    app.state.job_queue.enqueue(job).await.unwrap()
}

#[tokio::test]
async fn test_get_job_status() {
    let app = TestApp::new().await;
    let job_id = seed_job(&app, LifecycleAction::Create, "pr-42").await;

    let response = app.server.get(&format!("/api/jobs/{}", job_id)).await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["job_id"].as_str().unwrap(), job_id.to_string());
    assert_eq!(body["action"].as_str().unwrap(), "create");
    assert_eq!(body["environment"].as_str().unwrap(), "pr-42");
    assert_eq!(body["status"].as_str().unwrap(), "pending");
}

#[tokio::test]
async fn test_get_job_not_found() {
    let app = TestApp::new().await;

    let response = app
        .server
        .get(&format!("/api/jobs/{}", Uuid::new_v4()))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs() {
    let app = TestApp::new().await;
    seed_job(&app, LifecycleAction::Create, "pr-1").await;
    seed_job(&app, LifecycleAction::Delete, "pr-2").await;

    let response = app.server.get("/api/jobs").await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["total"].as_u64().unwrap(), 2);
}

#[tokio::test]
async fn test_queue_stats() {
    let app = TestApp::new().await;
    seed_job(&app, LifecycleAction::Create, "pr-1").await;
    seed_job(&app, LifecycleAction::Create, "pr-2").await;

    let response = app.server.get("/api/jobs/stats").await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["queue_length"].as_u64().unwrap(), 2);
}

#[tokio::test]
async fn test_cancel_pending_job() {
    let app = TestApp::new().await;
    let job_id = seed_job(&app, LifecycleAction::Refresh, "pr-1").await;

    let response = app.server.delete(&format!("/api/jobs/{}", job_id)).await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"].as_str().unwrap(), "cancelled");
}

#[tokio::test]
async fn test_requeue_failed_job() {
    let app = TestApp::new().await;
    let job_id = seed_job(&app, LifecycleAction::Create, "pr-1").await;

    // Simulate a worker picking it up and failing
    let _ = app.state.job_queue.dequeue(1).await.unwrap();
    app.state
        .job_queue
        .fail_job(job_id, "step 'git clone' failed".to_string(), true)
        .await
        .unwrap();

    let response = app
        .server
        .post(&format!("/api/jobs/{}/requeue", job_id))
        .await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"].as_str().unwrap(), "pending");
    assert!(body["error_message"].is_null());
}

#[tokio::test]
async fn test_requeue_pending_job_is_rejected() {
    let app = TestApp::new().await;
    let job_id = seed_job(&app, LifecycleAction::Create, "pr-1").await;

    let response = app
        .server
        .post(&format!("/api/jobs/{}/requeue", job_id))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_workflow_leaves_status_for_requeue() {
    // End to end recovery path: a webhook queues a create, the
    // workflow dies, the record keeps its in-flight status, the
    // operator requeues
    let app = TestApp::new().await;
    let factory = Factory::new(&app.state);
    factory.allow_repository(REPO).await;

    let payload = json!({
        "action": "opened",
        "number": 42,
        "pull_request": {
            "head": {
                "repo": { "ssh_url": REPO },
                "ref": "refs/heads/feature-x",
                "sha": "abc123"
            }
        }
    });
    app.server
        .post("/hooks/events")
        .add_header("X-Event-Kind", "pull_request")
        .add_header("X-Delivery-Id", "d-1")
        .json(&payload)
        .await
        .assert_status(StatusCode::OK);

    let job = app.state.job_queue.dequeue(1).await.unwrap().unwrap();
    app.state
        .job_queue
        .fail_job(job.id, "step 'pg_restore' failed".to_string(), true)
        .await
        .unwrap();

    let env = app
        .state
        .registry
        .find_by_name("pr-42")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(env.status, stagehand::models::EnvStatus::Creating);

    app.server
        .post(&format!("/api/jobs/{}/requeue", job.id))
        .await
        .assert_status(StatusCode::OK);
    assert_eq!(app.state.job_queue.queue_length().await.unwrap(), 1);
}
