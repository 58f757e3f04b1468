use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// TLS configuration for the coordinator's gRPC endpoint and its clients.
///
/// When enabled, communication uses mutual TLS (mTLS):
/// - The coordinator presents its certificate and verifies worker certificates
/// - Workers present their certificate and verify the coordinator's
/// - Both sides must have certificates signed by the same CA
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Enable TLS. If false, all other TLS settings are ignored.
    pub enabled: bool,

    /// Path to the CA certificate (PEM format).
    pub ca_cert_path: Option<PathBuf>,

    /// Path to this process's certificate (PEM format).
    pub cert_path: Option<PathBuf>,

    /// Path to this process's private key (PEM format).
    pub key_path: Option<PathBuf>,

    /// When true and TLS files are missing or unreadable, serve plaintext
    /// with a warning instead of refusing to start.
    pub allow_insecure: bool,
}

impl TlsConfig {
    /// Check if TLS is properly configured with all required files.
    pub fn is_complete(&self) -> bool {
        self.enabled
            && self.ca_cert_path.is_some()
            && self.cert_path.is_some()
            && self.key_path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub listen_addr: SocketAddr,
    /// Directory whose file names make up the token catalog
    pub token_dir: PathBuf,
    /// A lease without a heartbeat for this long may be re-assigned
    pub lease_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    /// Job records older than this are evicted by the sweeper
    pub job_retention_ms: u64,
    pub dashboard_addr: Option<SocketAddr>,
    pub tls: TlsConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:7001"
                .parse()
                .expect("default listen address is valid"),
            token_dir: PathBuf::from("/tf/images"),
            lease_timeout_ms: 60_000,
            sweep_interval_ms: 60 * 60 * 1000,
            job_retention_ms: 24 * 60 * 60 * 1000,
            dashboard_addr: None,
            tls: TlsConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(listen_addr: SocketAddr, token_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr,
            token_dir: token_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_dashboard(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }

    pub fn with_sweep(mut self, interval: Duration, retention: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis() as u64;
        self.job_retention_ms = retention.as_millis() as u64;
        self
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_millis(self.job_retention_ms)
    }

    /// Reject settings the coordinator's background tasks cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_ms == 0 {
            return Err("sweep interval has to be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub job_id: String,
    pub batch_size: u32,
    /// Upper bound on Get cycles before the worker exits
    pub num_batches: u32,
    pub heartbeat_interval_ms: u64,
    pub out_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            batch_size: 100,
            num_batches: 25,
            heartbeat_interval_ms: 10_000,
            out_dir: PathBuf::from("/tmp"),
        }
    }
}

impl WorkerConfig {
    /// Worker config for `job_id`, or for a freshly generated job ID when none is given.
    pub fn new(job_id: Option<String>) -> Self {
        match job_id {
            Some(job_id) => Self {
                job_id,
                ..Default::default()
            },
            None => Self::default(),
        }
    }

    pub fn with_batches(mut self, batch_size: u32, num_batches: u32) -> Self {
        self.batch_size = batch_size;
        self.num_batches = num_batches;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reject settings the worker loop cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.job_id.trim().is_empty() {
            return Err("job id cannot be empty".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch size has to be a positive integer".to_string());
        }
        if self.batch_size > i32::MAX as u32 {
            return Err(format!("batch size cannot exceed {}", i32::MAX));
        }
        if self.num_batches == 0 {
            return Err("number of batches has to be a positive integer".to_string());
        }
        if self.heartbeat_interval_ms == 0 {
            return Err("heartbeat interval has to be positive".to_string());
        }
        Ok(())
    }
}
