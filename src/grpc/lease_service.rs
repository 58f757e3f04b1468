use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::lease_service_server::LeaseService;
use crate::proto::{
    CatalogAck, DoneRequest, DoneResponse, GetRequest, GetResponse, HeartBeatRequest,
    HeartBeatResponse, RescanRequest, ResetRequest, ShowRequest, ShowResponse, ShuffleRequest,
};
use crate::scheduler::LeaseScheduler;

/// gRPC front of the [`LeaseScheduler`].
pub struct LeaseServiceImpl {
    scheduler: Arc<LeaseScheduler>,
}

impl LeaseServiceImpl {
    pub fn new(scheduler: Arc<LeaseScheduler>) -> Self {
        Self { scheduler }
    }
}

fn token_count(count: usize) -> CatalogAck {
    CatalogAck {
        token_count: i32::try_from(count).unwrap_or(i32::MAX),
    }
}

#[tonic::async_trait]
impl LeaseService for LeaseServiceImpl {
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();

        if req.job_id.is_empty() {
            return Err(Status::invalid_argument("Job ID cannot be empty"));
        }
        let batch_size = usize::try_from(req.batch_size)
            .ok()
            .filter(|&size| size > 0)
            .ok_or_else(|| {
                Status::invalid_argument(format!(
                    "Batch size must be positive, got {}",
                    req.batch_size
                ))
            })?;

        tracing::debug!(job_id = %req.job_id, batch_size, "Get request");
        let batch = self.scheduler.get(&req.job_id, batch_size).await?;

        Ok(Response::new(GetResponse {
            tokens: batch.tokens,
            lease_key: batch.lease_key,
        }))
    }

    async fn done(&self, request: Request<DoneRequest>) -> Result<Response<DoneResponse>, Status> {
        let req = request.into_inner();
        let accepted = self.scheduler.done(&req.job_id, &req.lease_key).await;
        Ok(Response::new(DoneResponse { accepted }))
    }

    async fn heart_beat(
        &self,
        request: Request<HeartBeatRequest>,
    ) -> Result<Response<HeartBeatResponse>, Status> {
        let req = request.into_inner();
        let job_completed = self
            .scheduler
            .heartbeat(&req.job_id, &req.lease_key)
            .await?;
        Ok(Response::new(HeartBeatResponse { job_completed }))
    }

    async fn reset(&self, _request: Request<ResetRequest>) -> Result<Response<CatalogAck>, Status> {
        Ok(Response::new(token_count(self.scheduler.reset().await)))
    }

    async fn rescan(
        &self,
        _request: Request<RescanRequest>,
    ) -> Result<Response<CatalogAck>, Status> {
        let count = self.scheduler.rescan().await.map_err(|e| {
            tracing::error!(error = %e, "Rescan failed");
            Status::from(e)
        })?;
        Ok(Response::new(token_count(count)))
    }

    async fn shuffle(
        &self,
        _request: Request<ShuffleRequest>,
    ) -> Result<Response<CatalogAck>, Status> {
        Ok(Response::new(token_count(self.scheduler.shuffle().await)))
    }

    async fn show(&self, _request: Request<ShowRequest>) -> Result<Response<ShowResponse>, Status> {
        let tokens = self.scheduler.show().await;
        Ok(Response::new(ShowResponse { tokens }))
    }
}
