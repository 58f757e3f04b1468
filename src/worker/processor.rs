use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{LeaseError, Result};

/// Per-token work performed by a worker. Each call yields one output record.
#[tonic::async_trait]
pub trait TokenProcessor: Send + Sync {
    async fn process(&self, token: &str) -> Result<String>;
}

/// Simulates compute with a fixed per-token delay and echoes the token.
#[derive(Debug, Clone)]
pub struct EchoProcessor {
    delay: Duration,
}

impl EchoProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[tonic::async_trait]
impl TokenProcessor for EchoProcessor {
    async fn process(&self, token: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(token.to_string())
    }
}

async fn ensure_dir(path: &Path, role: &str) -> Result<()> {
    if !tokio::fs::metadata(path).await?.is_dir() {
        return Err(LeaseError::InvalidConfig(format!(
            "{} {} is not a directory",
            role,
            path.display()
        )));
    }
    Ok(())
}

/// Record emitted for every copied file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRecord {
    pub filename: String,
    pub file_size: u64,
    pub read_time_ns: u64,
    pub write_time_ns: u64,
}

/// Copies `<source>/<token>` to `<destination>/<token>`.
#[derive(Debug, Clone)]
pub struct CopyProcessor {
    source: PathBuf,
    destination: PathBuf,
}

impl CopyProcessor {
    /// Creates the destination directory if needed.
    pub async fn create(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let destination = destination.into();
        ensure_dir(&source, "source").await?;
        tokio::fs::create_dir_all(&destination).await?;
        Ok(Self {
            source,
            destination,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

#[tonic::async_trait]
impl TokenProcessor for CopyProcessor {
    async fn process(&self, token: &str) -> Result<String> {
        let started = Instant::now();
        let bytes = tokio::fs::read(self.source.join(token)).await?;
        let read_time = started.elapsed();

        let started = Instant::now();
        tokio::fs::write(self.destination.join(token), &bytes).await?;
        let write_time = started.elapsed();

        let record = CopyRecord {
            filename: token.to_string(),
            file_size: bytes.len() as u64,
            read_time_ns: read_time.as_nanos() as u64,
            write_time_ns: write_time.as_nanos() as u64,
        };
        serde_json::to_string(&record).map_err(|e| LeaseError::Internal(e.to_string()))
    }
}

/// Read timings for one token on two storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoTestRecord {
    pub filename: String,
    pub file_size: u64,
    pub input_read_time_ns: u64,
    pub ref_read_time_ns: u64,
}

/// Disk benchmark: reads `<input>/<token>` and then `<reference>/<token>`,
/// timing each read. Nothing is written.
#[derive(Debug, Clone)]
pub struct IoTestProcessor {
    input: PathBuf,
    reference: PathBuf,
}

impl IoTestProcessor {
    pub async fn create(input: impl Into<PathBuf>, reference: impl Into<PathBuf>) -> Result<Self> {
        let input = input.into();
        let reference = reference.into();
        ensure_dir(&input, "input").await?;
        ensure_dir(&reference, "reference").await?;
        Ok(Self { input, reference })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }
}

#[tonic::async_trait]
impl TokenProcessor for IoTestProcessor {
    async fn process(&self, token: &str) -> Result<String> {
        let started = Instant::now();
        let bytes = tokio::fs::read(self.input.join(token)).await?;
        let input_read_time = started.elapsed();

        let started = Instant::now();
        tokio::fs::read(self.reference.join(token)).await?;
        let ref_read_time = started.elapsed();

        let record = IoTestRecord {
            filename: token.to_string(),
            file_size: bytes.len() as u64,
            input_read_time_ns: input_read_time.as_nanos() as u64,
            ref_read_time_ns: ref_read_time.as_nanos() as u64,
        };
        serde_json::to_string(&record).map_err(|e| LeaseError::Internal(e.to_string()))
    }
}
