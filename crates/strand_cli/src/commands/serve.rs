//! Serve command implementation.

use std::net::SocketAddr;
use strand_server::{
    DeliveryConfig, HookDispatcher, MemoryStorage, RequestHandler, ServerConfig, StrandServer,
};
use tracing::{info, warn};

/// Runs a node until interrupted.
pub fn run(
    bind: SocketAddr,
    max_connections: usize,
    max_frame_size: usize,
    hook_attempts: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let delivery = DeliveryConfig::new(hook_attempts);
    let config = ServerConfig::new(bind)
        .with_max_connections(max_connections)
        .with_max_frame_size(max_frame_size)
        .with_delivery(delivery.clone());

    let handler = RequestHandler::in_memory(MemoryStorage::new(), HookDispatcher::logging(delivery));
    let server = StrandServer::new(config, handler);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        server
            .run_until(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("interrupt received, shutting down"),
                    Err(err) => {
                        warn!(error = %err, "cannot listen for interrupts");
                        std::future::pending::<()>().await;
                    }
                }
            })
            .await
    })?;

    Ok(())
}
