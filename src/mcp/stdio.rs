//! stdio transports: a spawned backend child, and the process's own
//! stdin/stdout when running as a client-mode bridge.
//!
//! Framing policy on an established stdio stream: a malformed line is
//! logged and dropped, the stream continues. End-of-stream or an I/O error
//! closes the inbound side, which the owning session observes as EOF.

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::errors::ProxyError;
use crate::core::rpc::Message;
use crate::mcp::codec::JsonLineCodec;
use crate::mcp::process::ProcessSupervisor;
use crate::mcp::transport::{Transport, TransportPeer};
use crate::registry::BackendDescriptor;

/// Spawn a backend child and wire it up as a [`Transport`].
pub fn spawn_backend(desc: &BackendDescriptor) -> Result<Transport, ProxyError> {
    let (mut supervisor, stdin, stdout) = ProcessSupervisor::spawn(desc)?;
    let (transport, peer) = Transport::channel();
    let TransportPeer {
        outbound,
        inbound,
        cancel,
    } = peer;

    tokio::spawn(read_pump(stdout, inbound, cancel.clone()));

    // Writer task doubles as the child supervisor: once the outbound
    // channel drains shut, dropping the writer closes the child's stdin,
    // after which the child is reaped (with kill escalation).
    let mut writer = FramedWrite::new(stdin, JsonLineCodec::new());
    tokio::spawn(async move {
        let mut outbound = outbound;
        while let Some(msg) = outbound.recv().await {
            match tokio::time::timeout(crate::constants::limits::KILL_GRACE, writer.send(msg))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "backend stdin write failed");
                    break;
                }
                Err(_) => {
                    warn!("backend stopped reading its stdin, giving up");
                    break;
                }
            }
        }
        drop(outbound);
        drop(writer);
        supervisor.shutdown().await;
        // Stop the reader too in case the child never closed its stdout.
        cancel.cancel();
    });

    Ok(transport)
}

/// The process's own stdin/stdout as a [`Transport`] (client mode). The
/// parent on the other end speaks newline-delimited JSON like any backend.
pub fn parent_stdio() -> Transport {
    let (transport, peer) = Transport::channel();
    let TransportPeer {
        outbound,
        inbound,
        cancel,
    } = peer;

    tokio::spawn(read_pump(tokio::io::stdin(), inbound, cancel));

    let mut writer = FramedWrite::new(tokio::io::stdout(), JsonLineCodec::new());
    tokio::spawn(async move {
        let mut outbound = outbound;
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = writer.send(msg).await {
                error!(error = %e, "stdout write failed");
                break;
            }
        }
    });

    transport
}

async fn read_pump<R>(reader: R, inbound: mpsc::Sender<Message>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut frames = FramedRead::new(reader, JsonLineCodec::new());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => match frame {
                Some(Ok(msg)) => {
                    if inbound.send(msg).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    // Drop the frame, keep the stream.
                    warn!(error = %e, kind = e.kind(), "dropping malformed stdio frame");
                }
                None => {
                    debug!("stdio stream reached EOF");
                    break;
                }
            },
        }
    }
    // Dropping `inbound` here is what surfaces EOF to the session.
}
