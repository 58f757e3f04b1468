use tonic::transport::{Channel, Endpoint};

use crate::error::{LeaseError, Result};
use crate::proto::lease_service_client::LeaseServiceClient;
use crate::proto::{
    DoneRequest, GetRequest, HeartBeatRequest, RescanRequest, ResetRequest, ShowRequest,
    ShuffleRequest,
};
use crate::scheduler::{Batch, LeaseScheduler};
use crate::tls::TlsIdentity;

/// The three calls a worker makes against a coordinator.
#[tonic::async_trait]
pub trait LeaseApi: Send + Sync + 'static {
    async fn get(&self, job_id: &str, batch_size: u32) -> Result<Batch>;

    /// Returns whether the coordinator accepted the release, i.e. whether
    /// the worker may emit the batch's results.
    async fn done(&self, job_id: &str, lease_key: &str) -> Result<bool>;

    /// Returns whether the whole job has drained.
    async fn heartbeat(&self, job_id: &str, lease_key: &str) -> Result<bool>;
}

/// gRPC client for a remote coordinator.
#[derive(Debug, Clone)]
pub struct LeaseClient {
    inner: LeaseServiceClient<Channel>,
}

impl LeaseClient {
    /// Connect to `addr` (`host:port`, or a full `http://`/`https://` URI).
    pub async fn connect(addr: &str, tls_identity: Option<&TlsIdentity>) -> Result<Self> {
        let uri = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else if tls_identity.is_some() {
            format!("https://{}", addr)
        } else {
            format!("http://{}", addr)
        };

        let mut endpoint = Endpoint::from_shared(uri)?;
        if let Some(tls_identity) = tls_identity {
            endpoint = endpoint.tls_config(tls_identity.client_tls_config())?;
        }

        let channel = endpoint.connect().await?;
        tracing::debug!(addr, "Connected to coordinator");
        Ok(Self::from_channel(channel))
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self {
            inner: LeaseServiceClient::new(channel),
        }
    }

    pub async fn reset(&self) -> Result<usize> {
        let ack = self.inner.clone().reset(ResetRequest {}).await?.into_inner();
        Ok(ack.token_count.max(0) as usize)
    }

    pub async fn rescan(&self) -> Result<usize> {
        let ack = self.inner.clone().rescan(RescanRequest {}).await?.into_inner();
        Ok(ack.token_count.max(0) as usize)
    }

    pub async fn shuffle(&self) -> Result<usize> {
        let ack = self
            .inner
            .clone()
            .shuffle(ShuffleRequest {})
            .await?
            .into_inner();
        Ok(ack.token_count.max(0) as usize)
    }

    pub async fn show(&self) -> Result<Vec<String>> {
        let resp = self.inner.clone().show(ShowRequest {}).await?.into_inner();
        Ok(resp.tokens)
    }
}

#[tonic::async_trait]
impl LeaseApi for LeaseClient {
    async fn get(&self, job_id: &str, batch_size: u32) -> Result<Batch> {
        let batch_size = i32::try_from(batch_size)
            .map_err(|_| LeaseError::InvalidBatchSize(i64::from(batch_size)))?;
        let resp = self
            .inner
            .clone()
            .get(GetRequest {
                job_id: job_id.to_string(),
                batch_size,
            })
            .await?
            .into_inner();
        Ok(Batch::new(resp.tokens, resp.lease_key))
    }

    async fn done(&self, job_id: &str, lease_key: &str) -> Result<bool> {
        let resp = self
            .inner
            .clone()
            .done(DoneRequest {
                job_id: job_id.to_string(),
                lease_key: lease_key.to_string(),
            })
            .await?
            .into_inner();
        Ok(resp.accepted)
    }

    async fn heartbeat(&self, job_id: &str, lease_key: &str) -> Result<bool> {
        let resp = self
            .inner
            .clone()
            .heart_beat(HeartBeatRequest {
                job_id: job_id.to_string(),
                lease_key: lease_key.to_string(),
            })
            .await?
            .into_inner();
        Ok(resp.job_completed)
    }
}

/// In-process use, for workers embedded next to the coordinator.
#[tonic::async_trait]
impl LeaseApi for LeaseScheduler {
    async fn get(&self, job_id: &str, batch_size: u32) -> Result<Batch> {
        LeaseScheduler::get(self, job_id, batch_size as usize).await
    }

    async fn done(&self, job_id: &str, lease_key: &str) -> Result<bool> {
        Ok(LeaseScheduler::done(self, job_id, lease_key).await)
    }

    async fn heartbeat(&self, job_id: &str, lease_key: &str) -> Result<bool> {
        LeaseScheduler::heartbeat(self, job_id, lease_key).await
    }
}
