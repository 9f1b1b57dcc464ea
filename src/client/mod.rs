//! Client-mode bridging: the process's own stdio on one side, a remote
//! SSE or Streamable HTTP endpoint on the other.

pub mod sse;
pub mod streamable;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::core::errors::ProxyError;
use crate::mcp::session::{Session, SessionId};
use crate::mcp::stdio;

/// Bridge parent stdio to a remote SSE endpoint until either side closes
/// or shutdown is signalled.
pub async fn run_sse_client(
    url: &str,
    headers: HeaderMap,
    shutdown: CancellationToken,
) -> Result<(), ProxyError> {
    let remote = sse::connect(url, headers).await?;
    let parent = stdio::parent_stdio();
    Session::new(SessionId::mint(), parent, remote, shutdown)
        .run()
        .await;
    Ok(())
}

/// Bridge parent stdio to a remote Streamable HTTP endpoint.
pub async fn run_streamablehttp_client(
    url: &str,
    headers: HeaderMap,
    shutdown: CancellationToken,
) -> Result<(), ProxyError> {
    let remote = streamable::connect(url, headers)?;
    let parent = stdio::parent_stdio();
    Session::new(SessionId::mint(), parent, remote, shutdown)
        .run()
        .await;
    Ok(())
}

/// Assemble the outgoing header map from CLI `KEY VALUE` pairs plus the
/// `API_ACCESS_TOKEN` bearer fallback.
pub fn build_headers(pairs: &[(String, String)]) -> Result<HeaderMap, ProxyError> {
    let mut headers = HeaderMap::new();
    for (key, value) in pairs {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ProxyError::ConfigInvalid(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ProxyError::ConfigInvalid(format!("invalid header value for '{key}': {e}")))?;
        headers.insert(name, value);
    }
    if !headers.contains_key(reqwest::header::AUTHORIZATION) {
        if let Ok(token) = std::env::var("API_ACCESS_TOKEN") {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ProxyError::ConfigInvalid(format!("invalid API_ACCESS_TOKEN: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
    }
    Ok(headers)
}

/// Incremental parser for `text/event-stream` bodies. Collects `data:`
/// lines and emits one payload per blank-line-terminated event.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buf: String,
    data: Vec<String>,
}

impl SseParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns the data payloads of every event
    /// completed by this chunk.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut out = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    out.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
            // Other fields (event:, id:, retry:, comments) are irrelevant
            // to message delivery and are skipped.
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_event() {
        let mut p = SseParser::new();
        let out = p.feed(b"data: {\"a\":1}\n\n");
        assert_eq!(out, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn handles_chunks_split_mid_line() {
        let mut p = SseParser::new();
        assert!(p.feed(b"data: {\"a\"").is_empty());
        assert!(p.feed(b":1}\n").is_empty());
        let out = p.feed(b"\n");
        assert_eq!(out, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn joins_multiline_data() {
        let mut p = SseParser::new();
        let out = p.feed(b"data: line1\ndata: line2\n\n");
        assert_eq!(out, vec!["line1\nline2".to_string()]);
    }

    #[test]
    fn ignores_comments_and_other_fields() {
        let mut p = SseParser::new();
        let out = p.feed(b": keepalive\nevent: message\nid: 3\ndata: x\n\n");
        assert_eq!(out, vec!["x".to_string()]);
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut p = SseParser::new();
        let out = p.feed(b"data: a\n\ndata: b\n\n");
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn blank_lines_without_data_emit_nothing() {
        let mut p = SseParser::new();
        assert!(p.feed(b"\n\n: ping\n\n").is_empty());
    }
}
