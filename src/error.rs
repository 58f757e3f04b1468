use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeaseError {
    #[error(
        "Bookkeeping fault for job {job_id}: lease {lease_key} covers [{start}, {end}) but the catalog holds {catalog_len} tokens"
    )]
    BookkeepingFault {
        job_id: String,
        lease_key: String,
        start: usize,
        end: usize,
        catalog_len: usize,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Batch size must be positive, got {0}")]
    InvalidBatchSize(i64),

    #[error("Could not mint a unique lease key for job {0}")]
    KeyCollision(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gRPC error: {0}")]
    GrpcError(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LeaseError>;

impl From<LeaseError> for tonic::Status {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::JobNotFound(_) => tonic::Status::not_found(err.to_string()),
            LeaseError::InvalidBatchSize(_) | LeaseError::InvalidConfig(_) => {
                tonic::Status::invalid_argument(err.to_string())
            }
            LeaseError::Io(_) => tonic::Status::unavailable(err.to_string()),
            LeaseError::GrpcError(status) => status,
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}
