use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    registry::{Broadcaster, Registry},
};

/// Accepts consumers and owns the session registry for its lifetime.
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Server {
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind)
            .await
            .with_context(|| format!("failed to bind {}", config.bind))?;
        Ok(Self::new(listener, config))
    }

    pub fn new(listener: TcpListener, config: &ServerConfig) -> Self {
        Self {
            listener,
            registry: Registry::new(config.max_sessions, config.max_queue_depth),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster::new(Arc::clone(&self.registry))
    }

    /// Accepts connections until `shutdown` resolves, then closes every
    /// session and waits for their delivery tasks before returning.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry);
                }
            }
        }

        drop(listener);
        shutdown_sessions(&registry).await;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<Registry>,
) {
    match result {
        Ok((stream, peer)) => admit_connection(stream, peer, registry),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn admit_connection(stream: TcpStream, peer: SocketAddr, registry: &Arc<Registry>) {
    if registry.session_count() >= registry.max_sessions() {
        reject(peer, registry);
        return;
    }

    let stream = match shutdown_read(stream) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%peer, error = ?err, "failed to half-close connection");
            return;
        }
    };

    if registry.admit(peer, stream).is_err() {
        reject(peer, registry);
    }
}

fn reject(peer: SocketAddr, registry: &Registry) {
    warn!(%peer, limit = registry.max_sessions(), "refusing consumer: session limit reached");
}

/// Consumers never send anything, so the read side is shut down right away.
fn shutdown_read(stream: TcpStream) -> std::io::Result<TcpStream> {
    let stream = stream.into_std()?;
    stream.shutdown(std::net::Shutdown::Read)?;
    TcpStream::from_std(stream)
}

async fn shutdown_sessions(registry: &Registry) {
    let tasks = registry.close_all();
    info!(sessions = tasks.len(), "server shutting down");
    for result in join_all(tasks).await {
        if let Err(err) = result {
            debug!(error = ?err, "delivery task ended abnormally");
        }
    }
    info!("all consumer connections closed");
}
