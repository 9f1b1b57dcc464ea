//! SSE client transport.
//!
//! Opens a `GET` event stream against the remote endpoint. The first event
//! carries the companion POST URL for client-to-server messages; every
//! subsequent event carries one JSON-RPC message. No reconnection: the
//! transport closes when the stream ends.

use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest_eventsource::{Event, EventSource};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::constants::sse;
use crate::core::errors::ProxyError;
use crate::core::rpc::Message;
use crate::mcp::transport::{Transport, TransportPeer};

/// Connect to the remote SSE endpoint and return the transport once the
/// companion POST endpoint has been announced.
pub async fn connect(url: &str, headers: HeaderMap) -> Result<Transport, ProxyError> {
    let base = Url::parse(url)
        .map_err(|e| ProxyError::ConfigInvalid(format!("invalid upstream URL '{url}': {e}")))?;
    let client = reqwest::Client::new();

    let request = client.get(base.clone()).headers(headers.clone());
    let mut events =
        EventSource::new(request).map_err(|e| ProxyError::UpstreamHttp(e.to_string()))?;

    // The server announces the companion POST endpoint first.
    let endpoint = loop {
        match events.next().await {
            Some(Ok(Event::Open)) => continue,
            Some(Ok(Event::Message(ev))) => {
                if ev.event != sse::ENDPOINT_EVENT {
                    warn!(event = %ev.event, "expected endpoint announcement as first event");
                }
                break base.join(ev.data.trim()).map_err(|e| {
                    ProxyError::UpstreamHttp(format!("unusable endpoint URL '{}': {e}", ev.data))
                })?;
            }
            Some(Err(e)) => {
                events.close();
                return Err(ProxyError::UpstreamHttp(e.to_string()));
            }
            None => return Err(ProxyError::TransportClosed),
        }
    };
    info!(endpoint = %endpoint, "SSE session established");

    let (transport, peer) = Transport::channel();
    let TransportPeer {
        outbound,
        inbound,
        cancel,
    } = peer;

    // Inbound: server events -> session.
    let read_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = read_cancel.cancelled() => break,
                ev = events.next() => match ev {
                    Some(Ok(Event::Open)) => {}
                    Some(Ok(Event::Message(ev))) => match Message::parse(&ev.data) {
                        Ok(msg) => {
                            if inbound.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            // A malformed frame on HTTP aborts the session.
                            error!(error = %e, kind = e.kind(), "bad frame on SSE stream, aborting");
                            break;
                        }
                    },
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) => {
                        info!("upstream closed the SSE stream");
                        break;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "SSE stream error");
                        break;
                    }
                    None => break,
                },
            }
        }
        // Closing the source prevents the reconnection machinery from
        // re-opening the stream.
        events.close();
    });

    // Outbound: session -> companion POST endpoint.
    tokio::spawn(async move {
        let mut outbound = outbound;
        while let Some(msg) = outbound.recv().await {
            match client
                .post(endpoint.clone())
                .headers(headers.clone())
                .json(&msg)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    debug!(status = %resp.status(), "posted message");
                }
                Ok(resp) => {
                    error!(status = %resp.status(), "companion POST rejected, aborting session");
                    cancel.cancel();
                    break;
                }
                Err(e) => {
                    error!(error = %e, "companion POST failed, aborting session");
                    cancel.cancel();
                    break;
                }
            }
        }
    });

    Ok(transport)
}
