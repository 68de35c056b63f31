//! HTTP and WebSocket transport.
//!
//! Thin by intent: credential check, JSON in and out, status mapping. All
//! conversation behavior lives in [`ChatService`]; nothing in this module
//! knows what an agent is.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::chat::ChatService;
use crate::error::AgentError;

/// Browser origins allowed to call the API.
const ALLOWED_ORIGINS: [&str; 4] = [
    "https://localhost:3000",
    "https://127.0.0.1:3000",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    user_id: Option<String>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = ALLOWED_ORIGINS
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ]);

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// POST /chat
async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    // Credential check precedes body parsing; a bad key is 401 even when
    // the body is also malformed.
    let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if presented != Some(state.api_key.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized"})),
        );
    }

    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("invalid request: {e}")})),
            );
        }
    };

    match state
        .chat
        .handle(&request.message, request.user_id.as_deref())
        .await
    {
        Ok(reply) => (StatusCode::OK, Json(json!({"reply": reply.reply}))),
        Err(e) => {
            let status = error_status(&e);
            tracing::error!(status = %status, error = %e, "chat request failed");
            (status, Json(json!({"error": e.to_string()})))
        }
    }
}

fn error_status(error: &AgentError) -> StatusCode {
    match error {
        AgentError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AgentError::Model(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /ws - connectivity check, echoes text frames back.
async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

async fn handle_socket(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Text(text) = message {
            let frame = Message::Text(echo_frame(&text).into());
            if socket.send(frame).await.is_err() {
                break;
            }
        }
    }
}

fn echo_frame(text: &str) -> String {
    format!("Echo: {text}")
}

/// GET /healthz
async fn healthz_handler() -> &'static str {
    "ok"
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::history::HistoryStore;
    use crate::provider::scripted::ScriptedModel;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state_with(model: Arc<ScriptedModel>, run_timeout: Duration) -> AppState {
        let router = Arc::new(Agent::builder("router", model).build().unwrap());
        AppState {
            chat: Arc::new(ChatService::new(
                router,
                Arc::new(HistoryStore::new()),
                run_timeout,
            )),
            api_key: "secret-key".to_string(),
        }
    }

    fn chat_request(key: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/chat");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 10_000)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let model = Arc::new(ScriptedModel::final_reply("unused"));
        let app = build_router(state_with(model, Duration::from_secs(5)));

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 1_000).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn wrong_key_is_rejected_without_invoking_the_router() {
        let model = Arc::new(ScriptedModel::final_reply("never sent"));
        let app = build_router(state_with(model.clone(), Duration::from_secs(5)));

        let response = app
            .oneshot(chat_request(
                Some("wrong-key"),
                "{\"message\": \"hello\", \"user_id\": null}",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, json!({"error": "Unauthorized"}));
        assert_eq!(model.invocations(), 0);
    }

    #[tokio::test]
    async fn missing_key_beats_malformed_body() {
        let model = Arc::new(ScriptedModel::final_reply("never sent"));
        let app = build_router(state_with(model, Duration::from_secs(5)));

        let response = app
            .oneshot(chat_request(None, "this is not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_request_returns_the_reply() {
        let model = Arc::new(ScriptedModel::final_reply("routed answer"));
        let app = build_router(state_with(model, Duration::from_secs(5)));

        let response = app
            .oneshot(chat_request(
                Some("secret-key"),
                "{\"message\": \"hello\", \"user_id\": \"alice\"}",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"reply": "routed answer"}));
    }

    #[tokio::test]
    async fn malformed_body_with_a_valid_key_is_bad_request() {
        let model = Arc::new(ScriptedModel::final_reply("unused"));
        let app = build_router(state_with(model.clone(), Duration::from_secs(5)));

        let response = app
            .oneshot(chat_request(Some("secret-key"), "{\"no_message\": true}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(model.invocations(), 0);
    }

    #[tokio::test]
    async fn model_failure_maps_to_bad_gateway() {
        let model = Arc::new(ScriptedModel::failing(AgentError::Model(
            "endpoint is down".to_string(),
        )));
        let app = build_router(state_with(model, Duration::from_secs(5)));

        let response = app
            .oneshot(chat_request(Some("secret-key"), "{\"message\": \"hello\"}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn deadline_maps_to_gateway_timeout() {
        let model = Arc::new(
            ScriptedModel::final_reply("too slow").with_delay(Duration::from_millis(500)),
        );
        let app = build_router(state_with(model, Duration::from_millis(50)));

        let response = app
            .oneshot(chat_request(Some("secret-key"), "{\"message\": \"hello\"}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let model = Arc::new(ScriptedModel::final_reply("unused"));
        let app = build_router(state_with(model, Duration::from_secs(5)));

        let response = app
            .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn echo_frames_carry_the_prefix() {
        assert_eq!(echo_frame("hi"), "Echo: hi");
        assert_eq!(echo_frame(""), "Echo: ");
    }

    #[tokio::test]
    async fn ws_round_trips_frames_over_a_live_socket() {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::{connect_async, tungstenite};

        let model = Arc::new(ScriptedModel::final_reply("unused"));
        let app = build_router(state_with(model, Duration::from_secs(5)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (mut socket, response) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        assert_eq!(response.status().as_u16(), 101);

        socket.send(tungstenite::Message::text("hi")).await.unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match frame {
            tungstenite::Message::Text(text) => assert_eq!(text.as_str(), "Echo: hi"),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}
