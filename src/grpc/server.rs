use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::grpc::lease_service::LeaseServiceImpl;
use crate::proto::lease_service_server::LeaseServiceServer;
use crate::scheduler::LeaseScheduler;
use crate::tls::TlsIdentity;

pub struct GrpcServer {
    addr: SocketAddr,
    scheduler: Arc<LeaseScheduler>,
    tls_identity: Option<TlsIdentity>,
}

impl GrpcServer {
    pub fn new(
        addr: SocketAddr,
        scheduler: Arc<LeaseScheduler>,
        tls_identity: Option<TlsIdentity>,
    ) -> Self {
        Self {
            addr,
            scheduler,
            tls_identity,
        }
    }

    fn builder(&self) -> Result<Server, tonic::transport::Error> {
        let mut builder = Server::builder();
        if let Some(ref tls_identity) = self.tls_identity {
            builder = builder.tls_config(tls_identity.server_tls_config())?;
        }
        Ok(builder)
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), tonic::transport::Error> {
        let service = LeaseServiceServer::new(LeaseServiceImpl::new(self.scheduler.clone()));

        tracing::info!(
            addr = %self.addr,
            tls = self.tls_identity.is_some(),
            "Starting gRPC server"
        );

        self.builder()?
            .add_service(service)
            .serve_with_shutdown(self.addr, shutdown.cancelled_owned())
            .await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), tonic::transport::Error> {
        let service = LeaseServiceServer::new(LeaseServiceImpl::new(self.scheduler.clone()));

        tracing::info!(
            addr = ?listener.local_addr().ok(),
            tls = self.tls_identity.is_some(),
            "Starting gRPC server"
        );

        self.builder()?
            .add_service(service)
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                shutdown.cancelled_owned(),
            )
            .await
    }
}
