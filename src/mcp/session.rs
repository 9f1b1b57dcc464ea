//! A session pairs two transports and forwards frames in both directions.
//!
//! Correlation is end-to-end: frames are forwarded as they arrive, in
//! per-direction FIFO order, with ids untouched. The session does not wait
//! for responses and keeps no correlation state; a backend child is never
//! shared between sessions, so id spaces cannot collide.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::rpc::Message;
use crate::mcp::transport::Transport;

/// Opaque session identifier, minted per connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn mint() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct Session {
    id: SessionId,
    left: Transport,
    right: Transport,
    shutdown: CancellationToken,
}

impl Session {
    /// `left` is the incoming/parent side, `right` the backend side.
    /// `shutdown` is the external cancellation signal (client disconnect,
    /// process shutdown).
    pub fn new(id: SessionId, left: Transport, right: Transport, shutdown: CancellationToken) -> Self {
        Self {
            id,
            left,
            right,
            shutdown,
        }
    }

    /// Run both forwarders until either side ends or shutdown is signalled,
    /// then close both transports. Returns only after both directions have
    /// drained and stopped.
    pub async fn run(self) {
        let id = self.id.clone();
        info!(session = %id, "session started");

        let (l_tx, l_rx, l_cancel) = self.left.into_parts();
        let (r_tx, r_rx, r_cancel) = self.right.into_parts();

        // Halting stops the forwarders after they drain frames already
        // queued towards the peer.
        let halt = CancellationToken::new();

        let ltr = forward(l_rx, r_tx, halt.clone(), id.clone(), "left->right");
        let rtl = forward(r_rx, l_tx, halt.clone(), id.clone(), "right->left");
        tokio::pin!(ltr, rtl);

        let shutdown = self.shutdown.clone();
        let external = shutdown.cancelled();
        tokio::pin!(external);

        let mut ltr_done = false;
        let mut rtl_done = false;
        let mut halting = false;
        while !(ltr_done && rtl_done) {
            let begin_halt = tokio::select! {
                _ = &mut ltr, if !ltr_done => {
                    ltr_done = true;
                    true
                }
                _ = &mut rtl, if !rtl_done => {
                    rtl_done = true;
                    true
                }
                _ = &mut external, if !halting => true,
            };
            if begin_halt && !halting {
                halting = true;
                // Stop reading new frames on both sides; readers dropping
                // their inbound senders unblocks the forwarders.
                l_cancel.cancel();
                r_cancel.cancel();
                halt.cancel();
            }
        }

        info!(session = %id, "session terminated");
    }
}

/// One direction: deliver every frame from `rx` to `tx` in arrival order.
/// On halt, drain frames already queued, then stop.
async fn forward(
    mut rx: mpsc::Receiver<Message>,
    tx: mpsc::Sender<Message>,
    halt: CancellationToken,
    session: SessionId,
    direction: &'static str,
) {
    loop {
        tokio::select! {
            biased;
            _ = halt.cancelled() => {
                // Bounded drain: a peer that stopped reading must not hold
                // the teardown hostage.
                while let Ok(msg) = rx.try_recv() {
                    if tx
                        .send_timeout(msg, crate::constants::limits::KILL_GRACE)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                break;
            }
            msg = rx.recv() => match msg {
                Some(msg) => {
                    if tx.send(msg).await.is_err() {
                        debug!(session = %session, direction, "peer closed, stopping forwarder");
                        break;
                    }
                }
                None => {
                    debug!(session = %session, direction, "source ended");
                    break;
                }
            },
        }
    }
}
