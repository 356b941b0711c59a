//! Inspector HTTP server with WebSocket support

use super::store::PanelStore;
use crate::detail::{DetailContent, DetailTab};
use crate::panel::PanelSnapshot;
use crate::view::Filter;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use netpane_common::{constants::INSPECTOR_SERVICE, CompletedRecord, ObserverMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// App state for the inspector server
#[derive(Clone)]
struct AppState {
    store: Arc<PanelStore>,
}

/// Build the inspector router
pub fn router(store: Arc<PanelStore>) -> Router {
    let state = AppState { store };

    Router::new()
        // Health check (for port detection)
        .route("/api/health", get(health_check))
        // Panel state
        .route("/api/entries", get(get_entries))
        .route("/api/detail", get(get_detail))
        // Producers
        .route("/api/observer", post(submit_observer))
        .route("/api/completed", post(submit_completed))
        .route("/api/navigate", post(navigate))
        // Commands
        .route("/api/filter", post(set_filter))
        .route("/api/select/{index}", post(select_entry))
        .route("/api/selection", delete(clear_selection))
        .route("/api/tab", post(set_tab))
        .route("/api/clear", post(clear_entries))
        // WebSocket
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the inspector server on the given port
pub async fn start_server(port: u16, store: Arc<PanelStore>) -> Result<JoinHandle<()>> {
    let app = router(store);

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind inspector to {}", addr))?;

    tracing::info!("Inspector listening on http://{}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::warn!("Inspector server stopped: {}", e);
        }
    });

    Ok(handle)
}

// ============================================================================
// Health Check
// ============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub service: String,
    pub version: String,
    pub entries: usize,
}

/// Health check endpoint for port detection
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.store.snapshot().await;
    Json(HealthResponse {
        service: INSPECTOR_SERVICE.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        entries: snapshot.counts.total,
    })
}

// ============================================================================
// Panel State
// ============================================================================

async fn get_entries(State(state): State<AppState>) -> Json<PanelSnapshot> {
    Json(state.store.snapshot().await)
}

#[derive(Debug, Serialize)]
struct DetailResponse {
    selected: Option<usize>,
    tab: DetailTab,
    /// `None` until the render for the current selection lands
    content: Option<DetailContent>,
}

async fn get_detail(State(state): State<AppState>) -> Json<DetailResponse> {
    let (selected, tab, content) = state.store.detail().await;
    Json(DetailResponse {
        selected,
        tab,
        content,
    })
}

// ============================================================================
// Producers
// ============================================================================

async fn submit_observer(
    State(state): State<AppState>,
    Json(msg): Json<ObserverMessage>,
) -> StatusCode {
    state.store.handle_observer(msg).await;
    StatusCode::OK
}

async fn submit_completed(
    State(state): State<AppState>,
    Json(record): Json<CompletedRecord>,
) -> StatusCode {
    state.store.submit_completed(record).await;
    StatusCode::OK
}

/// Navigation signal with an optional snapshot of finished requests
#[derive(Debug, Deserialize, Serialize)]
pub struct NavigateRequest {
    pub url: Option<String>,
    #[serde(default)]
    pub events: Vec<ObserverMessage>,
    #[serde(default)]
    pub entries: Vec<CompletedRecord>,
}

async fn navigate(
    State(state): State<AppState>,
    Json(req): Json<NavigateRequest>,
) -> StatusCode {
    tracing::info!(
        "Navigation to {} with {} existing requests and {} events",
        req.url.as_deref().unwrap_or("(no url)"),
        req.entries.len(),
        req.events.len()
    );
    // Resolution and loading continue in the background
    state
        .store
        .navigate_with_events(req.url, req.events, req.entries)
        .await;
    StatusCode::ACCEPTED
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Deserialize)]
struct FilterBody {
    filter: String,
}

async fn set_filter(State(state): State<AppState>, Json(body): Json<FilterBody>) -> Response {
    match body.filter.parse::<Filter>() {
        Ok(filter) => {
            state.store.set_filter(filter).await;
            StatusCode::OK.into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e).into_response(),
    }
}

async fn select_entry(State(state): State<AppState>, Path(index): Path<usize>) -> Response {
    if state.store.select(index).await {
        StatusCode::OK.into_response()
    } else {
        (StatusCode::CONFLICT, "Entry is not selectable").into_response()
    }
}

async fn clear_selection(State(state): State<AppState>) -> StatusCode {
    state.store.clear_selection().await;
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct TabBody {
    tab: String,
}

async fn set_tab(State(state): State<AppState>, Json(body): Json<TabBody>) -> Response {
    match body.tab.parse::<DetailTab>() {
        Ok(tab) => {
            state.store.set_active_tab(tab).await;
            StatusCode::OK.into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e).into_response(),
    }
}

async fn clear_entries(State(state): State<AppState>) -> StatusCode {
    state.store.clear().await;
    StatusCode::OK
}

// ============================================================================
// WebSocket
// ============================================================================

/// WebSocket handler for live updates
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Decode an inbound frame as an observer message
fn decode_frame(msg: &Message) -> Option<ObserverMessage> {
    let decoded = match msg {
        Message::Binary(data) => ObserverMessage::from_bytes(data),
        Message::Text(text) => ObserverMessage::from_json(text.as_str()),
        _ => return None,
    };

    match decoded {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::warn!("Dropping malformed observer frame: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing falls in between
    let mut event_rx = state.store.subscribe();

    let snapshot = state.store.snapshot().await;
    let initial_msg = serde_json::json!({
        "event": "snapshot",
        "data": snapshot,
    });
    if let Ok(json) = serde_json::to_string(&initial_msg) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    // Spawn task to forward panel events to the socket
    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("WebSocket subscriber lagged, skipped {} events", skipped);
                }
                Err(_) => break,
            }
        }
    });

    // Inbound frames are observer messages
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(msg) => {
                if let Some(observed) = decode_frame(&msg) {
                    state.store.handle_observer(observed).await;
                }
            }
        }
    }

    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::Panel;
    use crate::scope::RetryPolicy;
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    fn store() -> Arc<PanelStore> {
        let retry = RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
        };
        Arc::new(PanelStore::new(Panel::default(), retry))
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Wait for the background scope resolution to land
    async fn wait_for_scope(store: &PanelStore) {
        for _ in 0..100 {
            if store.snapshot().await.scope.host().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("scope never resolved");
    }

    async fn navigated() -> Arc<PanelStore> {
        let store = store();
        let response = router(store.clone())
            .oneshot(json_request(
                "POST",
                "/api/navigate",
                serde_json::json!({"url": "https://x.test/", "entries": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        wait_for_scope(&store).await;
        store
    }

    #[tokio::test]
    async fn test_health_reports_service() {
        let response = router(store())
            .oneshot(empty_request("GET", "/api/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["service"], "netpane-inspector");
        assert_eq!(json["entries"], 0);
    }

    #[tokio::test]
    async fn test_observer_and_completed_correlate() {
        let store = navigated().await;
        let app = router(store.clone());

        let start = serde_json::json!({
            "type": "start", "requestId": "7", "url": "https://x.test/api/users",
            "method": "GET", "resourceType": "xmlhttprequest", "timeStamp": 1714557600000.0
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/observer", start))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let completed = serde_json::json!({
            "request": {"method": "GET", "url": "https://x.test/api/users"},
            "response": {"status": 200, "content": {"size": 900, "mimeType": "application/json"}},
            "time": 48.0,
            "_transferSize": 532
        });
        app.clone()
            .oneshot(json_request("POST", "/api/completed", completed))
            .await
            .unwrap();

        let json = body_json(app.oneshot(empty_request("GET", "/api/entries")).await.unwrap()).await;
        assert_eq!(json["count_label"], "1 request");
        assert_eq!(json["rows"][0]["state"], "completed");
        assert_eq!(json["rows"][0]["size"], "532 B");
    }

    #[tokio::test]
    async fn test_filter_command() {
        let store = navigated().await;
        let app = router(store.clone());

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/filter", serde_json::json!({"filter": "api"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.snapshot().await.filter, Filter::Api);

        let response = app
            .oneshot(json_request("POST", "/api/filter", serde_json::json!({"filter": "bogus"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_select_pending_is_conflict() {
        let store = navigated().await;
        store
            .handle_observer(ObserverMessage::from_json(
                r#"{"type":"start","requestId":"1","url":"https://x.test/slow","method":"GET"}"#,
            ).unwrap())
            .await;

        let response = router(store)
            .oneshot(empty_request("POST", "/api/select/0"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_select_tab_and_clear() {
        let store = store();
        let app = router(store.clone());

        let navigate = serde_json::json!({
            "url": "https://x.test/",
            "entries": [{
                "request": {"method": "POST", "url": "https://x.test/api/login",
                            "postData": {"mimeType": "application/json", "text": "{\"user\":\"ada\"}"}},
                "response": {"status": 200, "content": {"size": 2, "mimeType": "application/json"}}
            }]
        });
        app.clone()
            .oneshot(json_request("POST", "/api/navigate", navigate))
            .await
            .unwrap();
        wait_for_scope(&store).await;
        for _ in 0..100 {
            if store.snapshot().await.counts.total == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/tab", serde_json::json!({"tab": "payload"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/api/select/0"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut detail = serde_json::Value::Null;
        for _ in 0..100 {
            detail = body_json(
                app.clone()
                    .oneshot(empty_request("GET", "/api/detail"))
                    .await
                    .unwrap(),
            )
            .await;
            if !detail["content"].is_null() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(detail["tab"], "payload");
        assert_eq!(detail["content"]["blocks"][0]["title"], "Request Body");

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", "/api/selection"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.snapshot().await.selected, None);

        app.oneshot(empty_request("POST", "/api/clear")).await.unwrap();
        assert_eq!(store.snapshot().await.counts.total, 0);
    }

    #[test]
    fn test_decode_frames() {
        let msg = ObserverMessage::from_json(r#"{"type":"init","tabId":3}"#).unwrap();
        let binary = Message::Binary(msg.to_bytes().unwrap().into());
        assert_eq!(decode_frame(&binary), Some(msg));

        let text = Message::Text(r#"{"type":"error","requestId":"9","error":"x"}"#.to_string().into());
        assert!(decode_frame(&text).is_some());

        assert_eq!(decode_frame(&Message::Text("not json".to_string().into())), None);
    }
}
