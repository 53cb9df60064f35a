use axum::{body::Bytes, extract::State, http::HeaderMap};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::services::{EventDispatcher, JobScheduler};
use crate::state::AppState;

/// Receive a webhook event from the git host.
///
/// The response body is plain text aimed at the webhook delivery log on
/// the git host side, so event outcomes that are not the receiver's
/// fault (unknown events, repositories off the allow-list) still answer
/// 200 with an explanatory line. Only a payload the receiver cannot
/// parse is the sender's error and answers 400.
#[utoipa::path(
    post,
    path = "/hooks/events",
    request_body = String,
    params(
        ("X-Event-Kind" = String, Header, description = "Event kind, e.g. pull_request or push"),
        ("X-Delivery-Id" = String, Header, description = "Unique delivery identifier")
    ),
    responses(
        (status = 200, description = "Event accepted or explicitly ignored", body = String),
        (status = 400, description = "Missing headers or malformed payload")
    ),
    tag = "Webhooks"
)]
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<String> {
    let event_kind = header_value(&headers, "X-Event-Kind")?;
    let delivery_id = header_value(&headers, "X-Delivery-Id")?;

    tracing::info!(
        event_kind = %event_kind,
        delivery_id = %delivery_id,
        "Webhook event received"
    );

    let scheduler = JobScheduler::new(state.registry.clone(), state.job_queue.clone());
    let dispatcher = EventDispatcher::new(Arc::clone(&state.registry), scheduler);

    let outcome = dispatcher.handle(&event_kind, &body).await?;

    tracing::info!(
        delivery_id = %delivery_id,
        outcome = %outcome.message(),
        "Webhook event handled"
    );

    Ok(outcome.message().to_string())
}

fn header_value(headers: &HeaderMap, name: &'static str) -> AppResult<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .ok_or_else(|| AppError::Validation(format!("missing {name} header")))
}
