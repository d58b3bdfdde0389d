//! TCP server.

use crate::config::ServerConfig;
use crate::connection::serve_connection;
use crate::error::ServerResult;
use crate::handler::RequestHandler;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// A Strand node listening for client connections.
///
/// Each accepted connection runs on its own task with its own decoder;
/// all of them share the handler and its coordination state. At most
/// `max_connections` are served at once; further clients wait in the
/// listen backlog.
///
/// # Example
///
/// ```no_run
/// use strand_server::{
///     DeliveryConfig, HookDispatcher, MemoryStorage, RequestHandler, ServerConfig, StrandServer,
/// };
///
/// # async fn run() -> strand_server::ServerResult<()> {
/// let handler = RequestHandler::in_memory(
///     MemoryStorage::new(),
///     HookDispatcher::logging(DeliveryConfig::default()),
/// );
/// let server = StrandServer::new(ServerConfig::default(), handler);
/// server.run().await
/// # }
/// ```
pub struct StrandServer {
    config: ServerConfig,
    handler: Arc<RequestHandler>,
}

impl StrandServer {
    /// Creates a server.
    pub fn new(config: ServerConfig, handler: RequestHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared request handler.
    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    /// Binds the configured address and serves forever.
    pub async fn run(&self) -> ServerResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// resolves. Connections in progress are left to finish on their own.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let local: Option<SocketAddr> = listener.local_addr().ok();
        info!(addr = ?local, max_connections = self.config.max_connections, "listening");

        let slots = Arc::new(Semaphore::new(self.config.max_connections.max(1)));
        tokio::pin!(shutdown);

        loop {
            let slot = tokio::select! {
                _ = &mut shutdown => break,
                slot = Arc::clone(&slots).acquire_owned() => match slot {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                },
            };

            debug!(%peer, "connection accepted");
            if let Err(err) = stream.set_nodelay(true) {
                debug!(%peer, error = %err, "cannot set TCP_NODELAY");
            }

            let handler = Arc::clone(&self.handler);
            let max_frame_size = self.config.max_frame_size;
            tokio::spawn(async move {
                let peer = peer.to_string();
                if let Err(err) = serve_connection(stream, &handler, &peer, max_frame_size).await {
                    warn!(%peer, error = %err, "connection ended with error");
                }
                drop(slot);
            });
        }

        info!("server stopped");
        Ok(())
    }
}
