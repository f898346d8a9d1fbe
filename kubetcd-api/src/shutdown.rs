//! Graceful shutdown
//!
//! SIGTERM or SIGINT flips a watch flag; axum stops accepting connections and
//! drains in-flight etcd calls once it observes the flip.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ShutdownCoordinator {
    flag: Arc<watch::Sender<bool>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.flag.borrow()
    }

    /// Request shutdown; only the first request is logged
    pub fn shutdown(&self) {
        let first = self.flag.send_if_modified(|down| {
            if *down {
                false
            } else {
                *down = true;
                true
            }
        });

        if first {
            info!("Shutdown requested, draining in-flight requests");
        }
    }

    /// Block until SIGTERM or SIGINT arrives, then request shutdown
    pub async fn listen_for_signals(&self) {
        match wait_for_termination().await {
            Ok(name) => info!("Received {}", name),
            Err(e) => {
                warn!("Cannot listen for termination signals: {}", e);
                return;
            }
        }

        self.shutdown();
    }

    /// Resolves once shutdown has been requested
    pub fn signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.flag.subscribe();
        async move {
            let _ = rx.wait_for(|down| *down).await;
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}
