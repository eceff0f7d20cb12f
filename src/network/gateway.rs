//! Gateway - TCP listener that accepts IRC clients.
//!
//! The Gateway binds the IRC socket and spawns a [`Connection`] task for
//! each incoming client. Every task gets a child of the shutdown token, so
//! cancelling the root stops accepting and ends every connection loop.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::ListenConfig;
use crate::handlers::{IrcServices, Registry};
use crate::network::Connection;

/// The Gateway accepts incoming TCP connections and spawns handlers.
pub struct IrcGateway {
    listener: TcpListener,
    services: Arc<IrcServices>,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
}

impl IrcGateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(
        config: &ListenConfig,
        services: Arc<IrcServices>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.address).await?;
        info!(address = %listener.local_addr()?, "IRC listener bound");
        Ok(Self {
            listener,
            services,
            registry: Arc::new(Registry::new()),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            let (stream, addr) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(%addr, error = %e, "Could not set TCP_NODELAY");
            }

            let connection = Connection::new(
                stream,
                addr,
                Arc::clone(&self.services),
                Arc::clone(&self.registry),
                self.shutdown.child_token(),
            );
            info!(%addr, conn = %connection.id(), "Connection accepted");
            tokio::spawn(connection.run());
        }
        info!("IRC listener stopped");
        Ok(())
    }
}
