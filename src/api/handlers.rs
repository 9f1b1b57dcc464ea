//! Request handlers for the SSE and Streamable HTTP server endpoints.
//!
//! Session establishment spawns a fresh backend child per session and
//! pairs it with an HTTP-side transport in a [`Session`]. The handlers
//! hold only the manager's non-owning handles.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::api::sessions::{McpSession, SseSession};
use crate::api::AppState;
use crate::constants::limits;
use crate::constants::session::{SESSION_ID_HEADER, SESSION_ID_QUERY};
use crate::constants::sse::{ENDPOINT_EVENT, MESSAGE_EVENT};
use crate::core::errors::ProxyError;
use crate::core::rpc::{Message, MessageKind};
use crate::mcp::session::{Session, SessionId};
use crate::mcp::transport::Transport;

/// Health check endpoint, handled without touching any backend.
pub async fn handle_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn handle_sse_default(State(state): State<AppState>) -> Response {
    serve_sse(state, None).await
}

pub async fn handle_sse_named(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    serve_sse(state, Some(name)).await
}

/// `GET …/sse`: establish a session and stream child output as SSE events.
/// The first event announces the companion POST endpoint.
async fn serve_sse(state: AppState, backend: Option<String>) -> Response {
    let desc = match state.registry.resolve(backend.as_deref()) {
        Ok(desc) => desc.clone(),
        Err(e) => return route_not_found(e),
    };
    let child = match state.registry.instantiate(&desc) {
        Ok(child) => child,
        Err(e) => return spawn_failed(&desc.name, e),
    };

    let session_id = SessionId::mint();
    let cancel = CancellationToken::new();
    let (http_transport, peer) = Transport::channel();
    let (event_tx, event_rx) =
        mpsc::channel::<Result<Event, Infallible>>(limits::CHANNEL_CAPACITY);

    let prefix = backend
        .as_deref()
        .map(|name| format!("/servers/{name}"))
        .unwrap_or_default();
    let endpoint = format!("{prefix}/messages/?{SESSION_ID_QUERY}={session_id}");
    let _ = event_tx
        .send(Ok(Event::default().event(ENDPOINT_EVENT).data(endpoint)))
        .await;

    // Child output -> SSE events. A send failure means the HTTP client is
    // gone, which cancels the session.
    let pump_cancel = cancel.clone();
    let mut outbound = peer.outbound;
    state.sessions.spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let data = msg.to_json().unwrap_or_else(|_| "{}".to_string());
            if event_tx
                .send(Ok(Event::default().event(MESSAGE_EVENT).data(data)))
                .await
                .is_err()
            {
                debug!("SSE client disconnected");
                pump_cancel.cancel();
                break;
            }
        }
    });

    let handle = Arc::new(SseSession {
        to_peer: peer.inbound.clone(),
        cancel: cancel.clone(),
    });
    state
        .sessions
        .register_sse(session_id.to_string(), handle)
        .await;
    info!(session = %session_id, backend = %desc.name, "SSE session established");

    let manager = state.sessions.clone();
    let sid = session_id.clone();
    state.sessions.spawn(async move {
        Session::new(sid.clone(), http_transport, child, cancel).run().await;
        manager.remove(sid.as_str()).await;
    });

    Sse::new(ReceiverStream::new(event_rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// `POST …/messages/?session_id=…`: one client-to-server message for an
/// established SSE session.
pub async fn handle_messages(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    let Some(session_id) = params.get(SESSION_ID_QUERY) else {
        return (StatusCode::BAD_REQUEST, "missing session_id").into_response();
    };
    let msg = match Message::parse(&body) {
        Ok(msg) => msg,
        Err(e) => return bad_frame(e),
    };
    let Some(handle) = state.sessions.get_sse(session_id).await else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };
    if handle.to_peer.send(msg).await.is_err() {
        return (StatusCode::NOT_FOUND, "session closed").into_response();
    }
    StatusCode::ACCEPTED.into_response()
}

pub async fn handle_mcp_post_default(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    serve_mcp_post(state, None, headers, body).await
}

pub async fn handle_mcp_post_named(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    serve_mcp_post(state, Some(name), headers, body).await
}

/// `POST …/mcp`: Streamable HTTP. A POST without a session header
/// establishes a session; requests are answered with the correlated child
/// response, everything else with 202.
async fn serve_mcp_post(
    state: AppState,
    backend: Option<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let msg = match Message::parse(&body) {
        Ok(msg) => msg,
        Err(e) => return bad_frame(e),
    };

    if state.settings.stateless {
        return stateless_exchange(&state, backend, msg).await;
    }

    let (session_id, handle) = match header_str(&headers, SESSION_ID_HEADER) {
        Some(sid) => match state.sessions.get_mcp(sid).await {
            Some(handle) => (sid.to_string(), handle),
            None => return (StatusCode::NOT_FOUND, "unknown session").into_response(),
        },
        None => match establish_mcp_session(&state, backend).await {
            Ok(pair) => pair,
            Err(response) => return response,
        },
    };

    dispatch_mcp(&handle, &session_id, msg).await
}

/// Spawn a child and register a new Streamable HTTP session for it.
async fn establish_mcp_session(
    state: &AppState,
    backend: Option<String>,
) -> Result<(String, Arc<McpSession>), Response> {
    let desc = state
        .registry
        .resolve(backend.as_deref())
        .map_err(route_not_found)?;
    let child = state
        .registry
        .instantiate(desc)
        .map_err(|e| spawn_failed(&desc.name, e))?;
    let backend_name = desc.name.clone();

    let session_id = SessionId::mint();
    let cancel = CancellationToken::new();
    let (http_transport, peer) = Transport::channel();
    let pending: Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let (listener_tx, listener_rx) = mpsc::channel(limits::CHANNEL_CAPACITY);

    // Route child output: correlated responses back to the waiting POST
    // exchange, everything else to the listening stream.
    let demux_pending = pending.clone();
    let mut outbound = peer.outbound;
    state.sessions.spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let correlated = matches!(msg.kind(), Ok(MessageKind::Response));
            if correlated {
                if let Some(key) = msg.id_key() {
                    if let Some(waiter) = demux_pending.lock().await.remove(&key) {
                        let _ = waiter.send(msg);
                        continue;
                    }
                }
            }
            if listener_tx.try_send(msg).is_err() {
                debug!("no listener attached, dropping server-initiated message");
            }
        }
        // Waking in-flight exchanges beats letting them ride out the
        // request timeout during teardown.
        demux_pending.lock().await.clear();
    });

    let handle = Arc::new(McpSession {
        to_peer: peer.inbound.clone(),
        pending,
        listener: Mutex::new(Some(listener_rx)),
        cancel: cancel.clone(),
    });
    state
        .sessions
        .register_mcp(session_id.to_string(), handle.clone())
        .await;
    info!(session = %session_id, backend = %backend_name, "streamable session established");

    let manager = state.sessions.clone();
    let sid = session_id.clone();
    state.sessions.spawn(async move {
        Session::new(sid.clone(), http_transport, child, cancel).run().await;
        manager.remove(sid.as_str()).await;
    });

    Ok((session_id.to_string(), handle))
}

async fn dispatch_mcp(handle: &McpSession, session_id: &str, msg: Message) -> Response {
    match msg.kind() {
        Ok(MessageKind::Request) => {
            let key = msg.id_key().unwrap_or_default();
            let (tx, rx) = oneshot::channel();
            handle.pending.lock().await.insert(key.clone(), tx);

            if handle.to_peer.send(msg).await.is_err() {
                handle.pending.lock().await.remove(&key);
                return (StatusCode::BAD_GATEWAY, "backend unavailable").into_response();
            }

            match tokio::time::timeout(limits::REQUEST_TIMEOUT, rx).await {
                Ok(Ok(response)) => json_response(response, Some(session_id)),
                Ok(Err(_)) => (StatusCode::BAD_GATEWAY, "backend closed").into_response(),
                Err(_) => {
                    handle.pending.lock().await.remove(&key);
                    (StatusCode::GATEWAY_TIMEOUT, "backend did not respond").into_response()
                }
            }
        }
        // Notifications and client responses are one-way.
        _ => {
            if handle.to_peer.send(msg).await.is_err() {
                return (StatusCode::BAD_GATEWAY, "backend unavailable").into_response();
            }
            accepted(Some(session_id))
        }
    }
}

/// Stateless `POST …/mcp`: one fresh child per request, no session header.
async fn stateless_exchange(
    state: &AppState,
    backend: Option<String>,
    msg: Message,
) -> Response {
    let desc = match state.registry.resolve(backend.as_deref()) {
        Ok(desc) => desc.clone(),
        Err(e) => return route_not_found(e),
    };
    let mut child = match state.registry.instantiate(&desc) {
        Ok(child) => child,
        Err(e) => return spawn_failed(&desc.name, e),
    };

    let response = match msg.kind() {
        Ok(MessageKind::Request) => {
            let key = msg.id_key();
            if child.send(msg).await.is_err() {
                child.close();
                return (StatusCode::BAD_GATEWAY, "backend unavailable").into_response();
            }
            let correlated = tokio::time::timeout(limits::REQUEST_TIMEOUT, async {
                while let Some(reply) = child.recv().await {
                    let is_response = matches!(reply.kind(), Ok(MessageKind::Response));
                    if is_response && reply.id_key() == key {
                        return Some(reply);
                    }
                    debug!("dropping uncorrelated frame in stateless exchange");
                }
                None
            })
            .await;
            match correlated {
                Ok(Some(reply)) => json_response(reply, None),
                Ok(None) => (StatusCode::BAD_GATEWAY, "backend closed").into_response(),
                Err(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "backend did not respond").into_response()
                }
            }
        }
        _ => {
            let _ = child.send(msg).await;
            StatusCode::ACCEPTED.into_response()
        }
    };
    child.close();
    response
}

/// `GET …/mcp`: attach the listening stream for server-initiated messages.
pub async fn handle_mcp_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_str(&headers, SESSION_ID_HEADER) else {
        return (StatusCode::BAD_REQUEST, "missing mcp-session-id").into_response();
    };
    let Some(handle) = state.sessions.get_mcp(session_id).await else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };
    let Some(listener) = handle.listener.lock().await.take() else {
        return (StatusCode::CONFLICT, "listening stream already attached").into_response();
    };

    let stream = ReceiverStream::new(listener).map(|msg| {
        let data = msg.to_json().unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, Infallible>(Event::default().event(MESSAGE_EVENT).data(data))
    });
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// `DELETE …/mcp`: explicit session termination.
pub async fn handle_mcp_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_str(&headers, SESSION_ID_HEADER) else {
        return (StatusCode::BAD_REQUEST, "missing mcp-session-id").into_response();
    };
    let Some(handle) = state.sessions.get_mcp(session_id).await else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };
    handle.cancel.cancel();
    state.sessions.remove(session_id).await;
    StatusCode::ACCEPTED.into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn json_response(msg: Message, session_id: Option<&str>) -> Response {
    let body = msg.to_json().unwrap_or_else(|_| "{}".to_string());
    let mut response = ([("content-type", "application/json")], body).into_response();
    attach_session(&mut response, session_id);
    response
}

fn accepted(session_id: Option<&str>) -> Response {
    let mut response = StatusCode::ACCEPTED.into_response();
    attach_session(&mut response, session_id);
    response
}

fn attach_session(response: &mut Response, session_id: Option<&str>) {
    if let Some(sid) = session_id {
        if let Ok(value) = HeaderValue::from_str(sid) {
            response.headers_mut().insert(SESSION_ID_HEADER, value);
        }
    }
}

fn route_not_found(e: ProxyError) -> Response {
    debug!(error = %e, "route not found");
    (StatusCode::NOT_FOUND, e.to_string()).into_response()
}

fn spawn_failed(backend: &str, e: ProxyError) -> Response {
    error!(backend = %backend, error = %e, kind = e.kind(), "backend spawn failed");
    (StatusCode::BAD_GATEWAY, "failed to start backend").into_response()
}

fn bad_frame(e: ProxyError) -> Response {
    debug!(error = %e, kind = e.kind(), "rejecting frame");
    (StatusCode::BAD_REQUEST, e.to_string()).into_response()
}
