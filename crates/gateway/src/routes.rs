//! HTTP surface.
//!
//! Status mapping: 202 for accepted work, 404 unknown tenant, 409 session
//! not connected, 422 invalid input, 502 provider transport failure.

use {
    axum::{
        Json, Router,
        extract::{
            Path, State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
    },
    serde::Deserialize,
    serde_json::json,
    tokio::sync::broadcast,
};

use courier_common::JobOutcome;

use crate::service::{GatewayService, ScheduleResult};

pub fn router(service: GatewayService) -> Router {
    Router::new()
        .route("/v1/sessions", post(create_session))
        .route(
            "/v1/sessions/{tenant}",
            get(get_session).delete(delete_session),
        )
        .route("/v1/sessions/{tenant}/pairing", get(get_pairing))
        .route("/v1/sessions/{tenant}/messages", post(post_message))
        .route("/v1/sessions/{tenant}/scheduled", post(post_scheduled))
        .route("/v1/events", get(events_feed))
        .with_state(service)
}

fn error_body(message: &str) -> Json<serde_json::Value> {
    Json(json!({ "error": message }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    owner: String,
    display_name: Option<String>,
    tenant: Option<String>,
}

async fn create_session(
    State(service): State<GatewayService>,
    Json(request): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    if request.owner.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            error_body("owner must not be empty"),
        )
            .into_response();
    }
    let session = service
        .provision(&request.owner, request.display_name, request.tenant)
        .await;
    (StatusCode::ACCEPTED, Json(session)).into_response()
}

async fn get_session(
    State(service): State<GatewayService>,
    Path(tenant): Path<String>,
) -> impl IntoResponse {
    match service.describe(&tenant).await {
        Some(session) => (StatusCode::OK, Json(session)).into_response(),
        None => (StatusCode::NOT_FOUND, error_body("unknown tenant")).into_response(),
    }
}

async fn get_pairing(
    State(service): State<GatewayService>,
    Path(tenant): Path<String>,
) -> impl IntoResponse {
    match service.pairing(&tenant).await {
        Some(info) => (StatusCode::OK, Json(info)).into_response(),
        None => (StatusCode::NOT_FOUND, error_body("unknown tenant")).into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    recipient: String,
    body: String,
}

async fn post_message(
    State(service): State<GatewayService>,
    Path(tenant): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> impl IntoResponse {
    match service.send(&tenant, &request.recipient, &request.body).await {
        JobOutcome::Sent { message_id } => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "accepted", "messageId": message_id })),
        )
            .into_response(),
        JobOutcome::NotFound => {
            (StatusCode::NOT_FOUND, error_body("unknown tenant")).into_response()
        },
        JobOutcome::NotConnected => {
            (StatusCode::CONFLICT, error_body("session not connected")).into_response()
        },
        JobOutcome::Invalid { reason } => {
            (StatusCode::UNPROCESSABLE_ENTITY, error_body(&reason)).into_response()
        },
        JobOutcome::Transport { reason } => {
            (StatusCode::BAD_GATEWAY, error_body(&reason)).into_response()
        },
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleRequest {
    recipient: String,
    body: String,
    due_at_ms: u64,
}

async fn post_scheduled(
    State(service): State<GatewayService>,
    Path(tenant): Path<String>,
    Json(request): Json<ScheduleRequest>,
) -> impl IntoResponse {
    let result = service
        .schedule(&tenant, &request.recipient, &request.body, request.due_at_ms)
        .await;
    match result {
        Ok(ScheduleResult::Accepted(message)) => {
            (StatusCode::ACCEPTED, Json(message)).into_response()
        },
        Ok(ScheduleResult::NotFound) => {
            (StatusCode::NOT_FOUND, error_body("unknown tenant")).into_response()
        },
        Ok(ScheduleResult::Invalid(reason)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, error_body(&reason)).into_response()
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(&e.to_string()),
        )
            .into_response(),
    }
}

async fn events_feed(
    State(service): State<GatewayService>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let feed = service.state().realtime.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, feed))
}

async fn stream_events(mut socket: WebSocket, mut feed: broadcast::Receiver<String>) {
    loop {
        match feed.recv().await {
            Ok(frame) => {
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            },
            // A lagged subscriber loses the overwritten frames but stays on.
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn delete_session(
    State(service): State<GatewayService>,
    Path(tenant): Path<String>,
) -> impl IntoResponse {
    if service.release(&tenant).await {
        (StatusCode::OK, Json(json!({ "released": true }))).into_response()
    } else {
        (StatusCode::NOT_FOUND, error_body("unknown tenant")).into_response()
    }
}
