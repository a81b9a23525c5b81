//! Content-server collaborator contract.
//!
//! The HTTP layer that serves torrent files by index lives outside this
//! crate; the session core only needs to bind it, learn when a consumer
//! connects, and close it during teardown.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::swarm::SwarmHandle;

/// Events from the serving layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// A consumer opened a connection. The first one flips the session's
    /// monotonic `serving` flag.
    Connection,
}

/// A bound, listening content server.
#[async_trait]
pub trait ServerHandle: Send + Sync {
    fn port(&self) -> u16;

    /// Stop listening and drop in-flight responses.
    async fn close(&self) -> std::io::Result<()>;
}

/// Factory half of the contract.
#[async_trait]
pub trait ContentServer: Send + Sync {
    /// Bind to `port` and serve the swarm's files by index. Resolves once
    /// the listener is accepting connections; the caller races this against
    /// metadata arrival.
    async fn bind(
        &self,
        port: u16,
        swarm: Arc<dyn SwarmHandle>,
    ) -> Result<(Box<dyn ServerHandle>, mpsc::Receiver<ServerEvent>), Error>;
}
