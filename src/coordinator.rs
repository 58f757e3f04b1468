use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::CoordinatorConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::error::{LeaseError, Result};
use crate::grpc::GrpcServer;
use crate::scheduler::{DirectorySource, LeaseScheduler, RegistrySweeper, TokenSource};
use crate::tls::TlsIdentity;

/// Coordinator process: lease scheduler, registry sweeper, gRPC endpoint and
/// the optional dashboard.
pub struct Coordinator {
    config: CoordinatorConfig,
    scheduler: Arc<LeaseScheduler>,
    tls_identity: Option<TlsIdentity>,
}

impl Coordinator {
    /// Coordinator whose catalog is the file listing of `config.token_dir`.
    pub fn new(config: CoordinatorConfig, tls_identity: Option<TlsIdentity>) -> Self {
        let source = Arc::new(DirectorySource::new(config.token_dir.clone()));
        Self::with_source(config, source, tls_identity)
    }

    pub fn with_source(
        config: CoordinatorConfig,
        source: Arc<dyn TokenSource>,
        tls_identity: Option<TlsIdentity>,
    ) -> Self {
        let scheduler = Arc::new(LeaseScheduler::new(source, config.lease_timeout()));
        Self {
            config,
            scheduler,
            tls_identity,
        }
    }

    pub fn scheduler(&self) -> Arc<LeaseScheduler> {
        self.scheduler.clone()
    }

    /// Load the catalog and start the background tasks. An invalid config or
    /// a catalog that cannot be enumerated is fatal.
    async fn start(&self, shutdown: &CancellationToken) -> Result<()> {
        self.config.validate().map_err(LeaseError::InvalidConfig)?;

        let count = self.scheduler.rescan().await?;
        tracing::info!(tokens = count, dir = %self.config.token_dir.display(), "Catalog loaded");

        let sweeper = RegistrySweeper::new(
            self.scheduler.clone(),
            self.config.sweep_interval(),
            self.config.job_retention(),
        );
        tokio::spawn(sweeper.run(shutdown.clone()));

        if let Some(dashboard_addr) = self.config.dashboard_addr {
            let state = DashboardState {
                scheduler: self.scheduler.clone(),
            };
            tokio::spawn(run_dashboard(dashboard_addr, state, shutdown.clone()));
        }
        Ok(())
    }

    /// Serve on the configured address until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.start(&shutdown).await?;

        tracing::info!(
            listen_addr = %self.config.listen_addr,
            lease_timeout_ms = self.config.lease_timeout_ms,
            dashboard_addr = ?self.config.dashboard_addr,
            "Starting coordinator"
        );

        GrpcServer::new(self.config.listen_addr, self.scheduler, self.tls_identity)
            .run(shutdown)
            .await?;
        tracing::info!("Coordinator stopped");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        self.start(&shutdown).await?;

        GrpcServer::new(self.config.listen_addr, self.scheduler, self.tls_identity)
            .run_with_listener(listener, shutdown)
            .await?;
        Ok(())
    }
}
