//! Long-running service host.
//!
//! Services (the assessment workers, the batch coordinator) implement
//! [`Service`] and are driven by a [`ServiceHost`] that spawns each one,
//! waits for a shutdown signal, cancels the shared token, and joins the
//! tasks. Services honor cancellation at loop boundaries: finish the
//! current unit of work, then exit.

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[async_trait]
pub trait Service: Send + 'static {
    fn name(&self) -> &'static str;

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()>;
}

pub struct ServiceHost {
    services: Vec<Box<dyn Service>>,
    shutdown: CancellationToken,
}

impl ServiceHost {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_service(mut self, service: impl Service) -> Self {
        self.services.push(Box::new(service));
        self
    }

    /// Token handed to each service; cancelling it stops the host.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run every service until ctrl-c (or external cancellation), then
    /// wait for them to drain.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let mut handles = Vec::with_capacity(self.services.len());

        for service in self.services {
            let name = service.name();
            let token = self.shutdown.clone();
            info!(service = name, "starting service");

            handles.push(tokio::spawn(async move {
                if let Err(e) = service.run(token).await {
                    error!(service = name, error = %e, "service exited with error");
                }
            }));
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
            }
            _ = self.shutdown.cancelled() => {
                info!("shutdown token cancelled");
            }
        }

        self.shutdown.cancel();
        for handle in handles {
            let _ = handle.await;
        }

        info!("all services stopped");
        Ok(())
    }
}

impl Default for ServiceHost {
    fn default() -> Self {
        Self::new()
    }
}
