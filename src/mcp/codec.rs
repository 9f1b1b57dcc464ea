//! Newline-delimited JSON-RPC framing for stdio transports.
//!
//! Each frame is one compact JSON object terminated by `\n`. The protocol
//! puts no upper bound on line length, so neither does the decoder. A line
//! that fails to parse is consumed before the error is returned, so the
//! stream stays usable and the enclosing transport can decide to drop the
//! frame and continue.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::core::errors::ProxyError;
use crate::core::rpc::Message;

#[derive(Debug, Default)]
pub struct JsonLineCodec {
    // Offset of the first byte not yet scanned for a newline.
    scanned: usize,
}

impl JsonLineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for JsonLineCodec {
    type Item = Message;
    type Error = ProxyError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProxyError> {
        loop {
            let Some(pos) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = src.len();
                return Ok(None);
            };
            let line = src.split_to(self.scanned + pos + 1);
            self.scanned = 0;

            let text = std::str::from_utf8(&line)
                .map_err(|e| ProxyError::MalformedFrame(format!("invalid UTF-8: {e}")))?
                .trim_end_matches(['\n', '\r']);
            if text.trim().is_empty() {
                continue;
            }
            trace!(len = text.len(), "decoded frame line");
            return Message::parse(text).map(Some);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProxyError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Final line without a trailing newline.
        let line = src.split_to(src.len());
        self.scanned = 0;
        let text = std::str::from_utf8(&line)
            .map_err(|e| ProxyError::MalformedFrame(format!("invalid UTF-8: {e}")))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Message::parse(text.trim_end_matches(['\n', '\r'])).map(Some)
    }
}

impl Encoder<Message> for JsonLineCodec {
    type Error = ProxyError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), ProxyError> {
        let body = serde_json::to_vec(&item)
            .map_err(|e| ProxyError::MalformedFrame(e.to_string()))?;
        dst.reserve(body.len() + 1);
        dst.put_slice(&body);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rpc::MessageKind;

    fn buf(s: &str) -> BytesMut {
        BytesMut::from(s)
    }

    #[test]
    fn decodes_one_frame() {
        let mut codec = JsonLineCodec::new();
        let mut src = buf("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n");
        let msg = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(msg.kind().unwrap(), MessageKind::Request);
        assert!(src.is_empty());
    }

    #[test]
    fn waits_for_complete_line() {
        let mut codec = JsonLineCodec::new();
        let mut src = buf("{\"jsonrpc\":\"2.0\",");
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(b"\"method\":\"m\"}\n");
        assert!(codec.decode(&mut src).unwrap().is_some());
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut codec = JsonLineCodec::new();
        let mut src = buf(
            "{\"jsonrpc\":\"2.0\",\"method\":\"a\"}\n{\"jsonrpc\":\"2.0\",\"method\":\"b\"}\n",
        );
        let a = codec.decode(&mut src).unwrap().unwrap();
        let b = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(a.method.as_deref(), Some("a"));
        assert_eq!(b.method.as_deref(), Some("b"));
    }

    #[test]
    fn skips_blank_lines() {
        let mut codec = JsonLineCodec::new();
        let mut src = buf("\n\r\n{\"jsonrpc\":\"2.0\",\"method\":\"m\"}\n");
        let msg = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(msg.method.as_deref(), Some("m"));
    }

    #[test]
    fn bad_line_is_consumed_and_stream_continues() {
        let mut codec = JsonLineCodec::new();
        let mut src = buf("this is not json\n{\"jsonrpc\":\"2.0\",\"method\":\"m\"}\n");
        assert!(codec.decode(&mut src).is_err());
        let msg = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(msg.method.as_deref(), Some("m"));
    }

    #[test]
    fn handles_crlf() {
        let mut codec = JsonLineCodec::new();
        let mut src = buf("{\"jsonrpc\":\"2.0\",\"method\":\"m\"}\r\n");
        assert!(codec.decode(&mut src).unwrap().is_some());
    }

    #[test]
    fn encode_appends_newline() {
        let mut codec = JsonLineCodec::new();
        let msg = Message::parse("{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"x\"}").unwrap();
        let mut dst = BytesMut::new();
        codec.encode(msg, &mut dst).unwrap();
        assert_eq!(dst.last(), Some(&b'\n'));
        assert_eq!(dst.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn eof_flushes_an_unterminated_final_line() {
        let mut codec = JsonLineCodec::new();
        let mut src = buf("{\"jsonrpc\":\"2.0\",\"method\":\"m\"}");
        assert!(codec.decode(&mut src).unwrap().is_none());
        let msg = codec.decode_eof(&mut src).unwrap().unwrap();
        assert_eq!(msg.method.as_deref(), Some("m"));
        assert!(codec.decode_eof(&mut src).unwrap().is_none());
    }

    #[test]
    fn long_lines_are_not_truncated() {
        let big = "x".repeat(1 << 20);
        let mut codec = JsonLineCodec::new();
        let mut src = buf(&format!(
            "{{\"jsonrpc\":\"2.0\",\"method\":\"m\",\"params\":{{\"blob\":\"{big}\"}}}}\n"
        ));
        let msg = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(msg.rest["params"]["blob"].as_str().unwrap().len(), 1 << 20);
    }
}
