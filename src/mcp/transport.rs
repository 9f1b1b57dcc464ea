//! The uniform duplex transport handle.
//!
//! Every concrete transport (child stdio, parent stdio, SSE client,
//! Streamable HTTP client, HTTP server side) is a constructor that wires
//! internal pump tasks to the peer half of a channel pair and hands the
//! [`Transport`] half to a session. A session only ever sees this one shape,
//! so the forwarding logic is written once.
//!
//! The cancellation token stops the *receiving* side of the concrete
//! transport (stop reading new frames). Writers drain naturally: they run
//! until the outbound channel is closed by the session, then perform their
//! close protocol (e.g. close a child's stdin and reap it).

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::constants::limits;
use crate::core::errors::ProxyError;
use crate::core::rpc::Message;

/// Session-facing half: send towards the peer, receive from the peer.
#[derive(Debug)]
pub struct Transport {
    outbound: mpsc::Sender<Message>,
    inbound: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

/// Pump-facing half of the same channel pair.
#[derive(Debug)]
pub struct TransportPeer {
    /// Frames the session wants delivered to the peer.
    pub outbound: mpsc::Receiver<Message>,
    /// Frames arriving from the peer.
    pub inbound: mpsc::Sender<Message>,
    /// Cancelled when the receiving side must stop reading.
    pub cancel: CancellationToken,
}

impl Transport {
    /// Create a transport and its pump-facing peer half.
    pub fn channel() -> (Transport, TransportPeer) {
        let (out_tx, out_rx) = mpsc::channel(limits::CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(limits::CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        (
            Transport {
                outbound: out_tx,
                inbound: in_rx,
                cancel: cancel.clone(),
            },
            TransportPeer {
                outbound: out_rx,
                inbound: in_tx,
                cancel,
            },
        )
    }

    pub async fn send(&self, msg: Message) -> Result<(), ProxyError> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| ProxyError::TransportClosed)
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    /// Clone of the outbound sender, for callers that need to inject frames
    /// without owning the transport.
    pub fn sender(&self) -> mpsc::Sender<Message> {
        self.outbound.clone()
    }

    /// Stop the receiving side of the concrete transport.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Decompose into raw parts for the session forwarders.
    pub fn into_parts(self) -> (mpsc::Sender<Message>, mpsc::Receiver<Message>, CancellationToken)
    {
        (self.outbound, self.inbound, self.cancel)
    }
}
