use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::sync::SyncHub;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct WebAppState {
    hub: Arc<SyncHub>,
    /// Cancelled when the server stops; open sockets close on it.
    shutdown: CancellationToken,
}

impl WebAppState {
    pub fn new(hub: Arc<SyncHub>, shutdown: CancellationToken) -> Self {
        Self { hub, shutdown }
    }

    pub fn hub(&self) -> &Arc<SyncHub> {
        &self.hub
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
