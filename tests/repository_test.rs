mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{Factory, TestApp};

const REPO: &str = "git@github.com:acme/webshop.git";

#[tokio::test]
async fn test_allow_repository() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/repositories")
        .json(&json!({
            "url": REPO,
            "allowed_by": "alex"
        }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["url"].as_str().unwrap(), REPO);
    assert_eq!(body["allowed_by"].as_str().unwrap(), "alex");

    assert!(app.state.registry.repository_allowed(REPO).await.unwrap());
}

#[tokio::test]
async fn test_allow_repository_duplicate() {
    let app = TestApp::new().await;
    let factory = Factory::new(&app.state);
    factory.allow_repository(REPO).await;

    let response = app
        .server
        .post("/api/repositories")
        .json(&json!({
            "url": REPO,
            "allowed_by": "alex"
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_repositories() {
    let app = TestApp::new().await;
    let factory = Factory::new(&app.state);
    factory.allow_repository(REPO).await;
    factory
        .allow_repository("git@github.com:acme/billing.git")
        .await;

    let response = app.server.get("/api/repositories").await;

    response.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["total"].as_u64().unwrap(), 2);
}

#[tokio::test]
async fn test_disallow_repository() {
    let app = TestApp::new().await;
    let factory = Factory::new(&app.state);
    factory.allow_repository(REPO).await;

    let response = app
        .server
        .delete("/api/repositories")
        .json(&json!({ "url": REPO }))
        .await;

    response.assert_status(StatusCode::OK);
    assert!(!app.state.registry.repository_allowed(REPO).await.unwrap());
}

#[tokio::test]
async fn test_disallow_unknown_repository() {
    let app = TestApp::new().await;

    let response = app
        .server
        .delete("/api/repositories")
        .json(&json!({ "url": "git@github.com:acme/ghost.git" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}
