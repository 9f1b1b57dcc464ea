//! Live session registry for server mode.
//!
//! The manager holds only non-owning handles: sender clones, pending-wait
//! maps and cancellation tokens. Transports and children are owned by the
//! session tasks themselves, so dropping a handle never leaks a process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::core::rpc::Message;

/// Handle to a live SSE session.
pub struct SseSession {
    /// Frames arriving from the HTTP client via the companion POST.
    pub to_peer: mpsc::Sender<Message>,
    pub cancel: CancellationToken,
}

/// Handle to a live Streamable HTTP session.
pub struct McpSession {
    pub to_peer: mpsc::Sender<Message>,
    /// POST exchanges waiting for the child response with a matching id.
    pub pending: Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>,
    /// Stream of server-initiated messages, claimed by at most one GET.
    pub listener: Mutex<Option<mpsc::Receiver<Message>>>,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub struct SessionManager {
    sse: RwLock<HashMap<String, Arc<SseSession>>>,
    mcp: RwLock<HashMap<String, Arc<McpSession>>>,
    /// Creation order, for reverse-order teardown.
    order: Mutex<Vec<(String, CancellationToken)>>,
    tracker: TaskTracker,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a session-scoped task that shutdown will wait on.
    pub fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(future);
    }

    pub async fn register_sse(&self, id: String, handle: Arc<SseSession>) {
        let cancel = handle.cancel.clone();
        self.sse.write().await.insert(id.clone(), handle);
        self.order.lock().await.push((id, cancel));
    }

    pub async fn register_mcp(&self, id: String, handle: Arc<McpSession>) {
        let cancel = handle.cancel.clone();
        self.mcp.write().await.insert(id.clone(), handle);
        self.order.lock().await.push((id, cancel));
    }

    pub async fn get_sse(&self, id: &str) -> Option<Arc<SseSession>> {
        self.sse.read().await.get(id).cloned()
    }

    pub async fn get_mcp(&self, id: &str) -> Option<Arc<McpSession>> {
        self.mcp.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) {
        self.sse.write().await.remove(id);
        self.mcp.write().await.remove(id);
        self.order.lock().await.retain(|(sid, _)| sid != id);
        debug!(session = %id, "session unregistered");
    }

    /// Cancel every live session, newest first, and wait for all session
    /// tasks to finish.
    pub async fn shutdown_all(&self) {
        let order = std::mem::take(&mut *self.order.lock().await);
        for (id, cancel) in order.into_iter().rev() {
            debug!(session = %id, "cancelling session");
            cancel.cancel();
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.sse.write().await.clear();
        self.mcp.write().await.clear();
    }
}
