//! Streamable HTTP client transport.
//!
//! One POST per outbound message. The response is either a single JSON
//! message or an SSE stream of messages; the server-issued
//! `Mcp-Session-Id` header is captured on first sight and echoed on every
//! later request. A long-lived GET listener picks up server-initiated
//! messages once a session id is known.

use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::Response;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

use crate::client::SseParser;
use crate::constants::session::SESSION_ID_HEADER;
use crate::core::errors::ProxyError;
use crate::core::rpc::Message;
use crate::mcp::transport::{Transport, TransportPeer};

/// Build the transport. The connection itself is lazy: nothing goes on the
/// wire until the parent sends its first message.
pub fn connect(url: &str, headers: HeaderMap) -> Result<Transport, ProxyError> {
    let endpoint = Url::parse(url)
        .map_err(|e| ProxyError::ConfigInvalid(format!("invalid upstream URL '{url}': {e}")))?;
    let client = reqwest::Client::new();

    let (transport, peer) = Transport::channel();
    let TransportPeer {
        outbound,
        inbound,
        cancel,
    } = peer;
    let session_id: Arc<RwLock<Option<String>>> = Arc::new(RwLock::new(None));

    tokio::spawn(post_loop(
        client,
        endpoint,
        headers,
        outbound,
        inbound,
        cancel,
        session_id,
    ));

    Ok(transport)
}

#[allow(clippy::too_many_arguments)]
async fn post_loop(
    client: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    mut outbound: mpsc::Receiver<Message>,
    inbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
    session_id: Arc<RwLock<Option<String>>>,
) {
    while let Some(msg) = outbound.recv().await {
        let mut request = client
            .post(endpoint.clone())
            .headers(headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&msg);
        if let Some(sid) = session_id.read().await.clone() {
            request = request.header(SESSION_ID_HEADER, sid);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "POST failed, aborting session");
                break;
            }
        };

        if let Some(sid) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut guard = session_id.write().await;
            if guard.is_none() {
                info!(session = %sid, "upstream issued a session id");
                *guard = Some(sid.to_string());
                tokio::spawn(listen(
                    client.clone(),
                    endpoint.clone(),
                    headers.clone(),
                    sid.to_string(),
                    inbound.clone(),
                    cancel.clone(),
                ));
            }
        }

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "upstream rejected POST, aborting session");
            break;
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let delivered = if content_type.starts_with("application/json") {
            deliver_json(response, &inbound).await
        } else if content_type.starts_with("text/event-stream") {
            deliver_sse(response, &inbound).await
        } else {
            // 202-style acknowledgements carry no body.
            Ok(())
        };
        if let Err(e) = delivered {
            error!(error = %e, kind = e.kind(), "failed to deliver upstream response, aborting");
            break;
        }
    }
    // Stops the listener and, by dropping `inbound`, surfaces EOF.
    cancel.cancel();
}

async fn deliver_json(
    response: Response,
    inbound: &mpsc::Sender<Message>,
) -> Result<(), ProxyError> {
    let body = response
        .text()
        .await
        .map_err(|e| ProxyError::UpstreamHttp(e.to_string()))?;
    if body.trim().is_empty() {
        return Ok(());
    }
    let msg = Message::parse(&body)?;
    inbound
        .send(msg)
        .await
        .map_err(|_| ProxyError::TransportClosed)
}

/// Drain an SSE-framed response body into the inbound channel until the
/// server closes it.
async fn deliver_sse(
    response: Response,
    inbound: &mpsc::Sender<Message>,
) -> Result<(), ProxyError> {
    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProxyError::UpstreamHttp(e.to_string()))?;
        for payload in parser.feed(&chunk) {
            let msg = Message::parse(&payload)?;
            inbound
                .send(msg)
                .await
                .map_err(|_| ProxyError::TransportClosed)?;
        }
    }
    Ok(())
}

/// Best-effort listening stream for server-initiated messages. Servers
/// that do not support it answer with an error status, which is fine.
async fn listen(
    client: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    session_id: String,
    inbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
) {
    let request = client
        .get(endpoint)
        .headers(headers)
        .header(ACCEPT, "text/event-stream")
        .header(SESSION_ID_HEADER, session_id);
    let response = match request.send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            debug!(status = %r.status(), "upstream offers no listening stream");
            return;
        }
        Err(e) => {
            debug!(error = %e, "listening stream unavailable");
            return;
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => {}
        result = deliver_sse(response, &inbound) => {
            if let Err(e) = result {
                debug!(error = %e, "listening stream ended");
            }
        }
    }
}
