use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use token_lease::config::{CoordinatorConfig, TlsConfig, WorkerConfig};
use token_lease::coordinator::Coordinator;
use token_lease::shutdown::install_shutdown_handler;
use token_lease::tls::TlsIdentity;
use token_lease::worker::{
    BatchRunner, CopyProcessor, EchoProcessor, IoTestProcessor, LeaseClient, RunSummary,
    TokenProcessor,
};

#[derive(Parser, Debug)]
#[command(name = "token-lease")]
#[command(version)]
#[command(about = "Lease-based work distribution over a shared token catalog")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the coordinator
    Server(ServerArgs),

    /// Catalog administration
    Admin {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Run a worker against the coordinator
    Work(WorkArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port to listen on for gRPC
    #[arg(long, default_value = "7001")]
    port: u16,

    /// Directory whose file names form the token catalog
    #[arg(long, default_value = "/tf/images")]
    dir: PathBuf,

    /// Milliseconds without a heartbeat before a lease may be re-assigned
    #[arg(long, default_value = "60000")]
    lease_timeout_ms: u64,

    /// How often finished and abandoned job records are swept
    #[arg(long, default_value = "3600000")]
    sweep_interval_ms: u64,

    /// Job records older than this are removed by the sweep
    #[arg(long, default_value = "86400000")]
    job_retention_ms: u64,

    /// Port for the web dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Enable mutual TLS on the gRPC endpoint
    #[arg(long)]
    tls: bool,

    /// Path to CA certificate (PEM format)
    #[arg(long, requires = "tls")]
    ca_cert: Option<PathBuf>,

    /// Path to server certificate (PEM format)
    #[arg(long, requires = "tls")]
    cert: Option<PathBuf>,

    /// Path to server private key (PEM format)
    #[arg(long, requires = "tls")]
    key: Option<PathBuf>,

    /// Serve plaintext when --tls is given but the certificates cannot be loaded
    #[arg(long)]
    allow_insecure: bool,
}

// =============================================================================
// Client Arguments (shared by admin and work commands)
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Coordinator address
    #[arg(long, short = 'a', default_value = "127.0.0.1:7001")]
    addr: String,

    /// Path to CA certificate (PEM format) for mTLS
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (PEM format) for mTLS
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Path to client private key (PEM format) for mTLS
    #[arg(long)]
    key: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum AdminCommands {
    /// Forget every job; the catalog is kept
    Reset,
    /// Re-read the token directory and forget every job
    Rescan,
    /// Shuffle the catalog in place
    Shuffle,
    /// Print the catalog
    Show,
}

// =============================================================================
// Work Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct WorkArgs {
    #[command(flatten)]
    client: ClientArgs,

    /// Job to join (a new UUID when omitted)
    #[arg(long)]
    job_id: Option<String>,

    #[arg(long, default_value = "100")]
    batch_size: u32,

    /// Maximum number of batches to lease
    #[arg(long, default_value = "25")]
    num_batches: u32,

    #[arg(long, default_value = "10000")]
    heartbeat_interval_ms: u64,

    /// Results go to <out-dir>/<job-id>/
    #[arg(long, default_value = "/tmp")]
    out_dir: PathBuf,

    #[command(subcommand)]
    processor: ProcessorCommands,
}

#[derive(clap::Subcommand, Debug)]
enum ProcessorCommands {
    /// Echo each token after a simulated compute delay
    Echo {
        #[arg(long, default_value = "100")]
        compute_delay_ms: u64,
    },
    /// Copy each token's file from one directory to another
    Copy {
        #[arg(long)]
        source_dir: PathBuf,

        #[arg(long)]
        destination_dir: PathBuf,
    },
    /// Time reads of each token from an input and a reference directory
    Iotest {
        #[arg(long, default_value = "/tf/images")]
        input_dir: PathBuf,

        #[arg(long, default_value = "/local/images")]
        ref_dir: PathBuf,
    },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct CatalogAckOutput {
    operation: &'static str,
    token_count: usize,
}

#[derive(Serialize)]
struct ShowOutput {
    token_count: usize,
    tokens: Vec<String>,
}

#[derive(Serialize)]
struct WorkOutput {
    job_id: String,
    batches_accepted: usize,
    batches_rejected: usize,
    batches_abandoned: usize,
    tokens_processed: usize,
    output_path: Option<String>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn client_tls(args: &ClientArgs) -> Result<Option<TlsIdentity>, Box<dyn std::error::Error>> {
    if args.ca_cert.is_none() {
        return Ok(None);
    }
    let config = TlsConfig {
        enabled: true,
        ca_cert_path: args.ca_cert.clone(),
        cert_path: args.cert.clone(),
        key_path: args.key.clone(),
        allow_insecure: false,
    };
    Ok(Some(TlsIdentity::load(&config).await?))
}

async fn connect(args: &ClientArgs) -> Result<LeaseClient, Box<dyn std::error::Error>> {
    let tls_identity = client_tls(args).await?;
    Ok(LeaseClient::connect(&args.addr, tls_identity.as_ref()).await?)
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let mut config = CoordinatorConfig::new(listen_addr, args.dir)
        .with_lease_timeout(Duration::from_millis(args.lease_timeout_ms))
        .with_sweep(
            Duration::from_millis(args.sweep_interval_ms),
            Duration::from_millis(args.job_retention_ms),
        );
    if let Some(port) = args.dashboard_port {
        config = config.with_dashboard(format!("0.0.0.0:{}", port).parse()?);
    }
    config.validate()?;

    let tls_config = TlsConfig {
        enabled: args.tls,
        ca_cert_path: args.ca_cert,
        cert_path: args.cert,
        key_path: args.key,
        allow_insecure: args.allow_insecure,
    };
    let tls_identity = TlsIdentity::resolve(&tls_config).await?;
    config.tls = tls_config;

    let shutdown = install_shutdown_handler();
    Coordinator::new(config, tls_identity).run(shutdown).await?;
    Ok(())
}

// =============================================================================
// Admin Command Handlers
// =============================================================================

async fn handle_admin(
    client: &LeaseClient,
    command: AdminCommands,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let (operation, token_count) = match command {
        AdminCommands::Reset => ("reset", client.reset().await?),
        AdminCommands::Rescan => ("rescan", client.rescan().await?),
        AdminCommands::Shuffle => ("shuffle", client.shuffle().await?),
        AdminCommands::Show => {
            let tokens = client.show().await?;
            match output_format {
                OutputFormat::Json => {
                    let output = ShowOutput {
                        token_count: tokens.len(),
                        tokens,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    println!("{:<8} TOKEN", "INDEX");
                    println!("{}", "-".repeat(40));
                    for (index, token) in tokens.iter().enumerate() {
                        println!("{:<8} {}", index, token);
                    }
                    println!();
                    println!("{} tokens", tokens.len());
                }
            }
            return Ok(());
        }
    };

    match output_format {
        OutputFormat::Json => {
            let output = CatalogAckOutput {
                operation,
                token_count,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("{} done, catalog holds {} tokens", operation, token_count);
        }
    }
    Ok(())
}

// =============================================================================
// Worker Implementation
// =============================================================================

async fn run_worker<P: TokenProcessor>(
    client: LeaseClient,
    processor: P,
    config: WorkerConfig,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let shutdown = install_shutdown_handler();
    let runner = BatchRunner::new(Arc::new(client), processor, config);
    Ok(runner.run(&shutdown).await?)
}

async fn handle_work(args: WorkArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = WorkerConfig::new(args.job_id)
        .with_batches(args.batch_size, args.num_batches)
        .with_heartbeat_interval(Duration::from_millis(args.heartbeat_interval_ms))
        .with_out_dir(args.out_dir);
    config.validate()?;

    let client = connect(&args.client).await?;
    let job_id = config.job_id.clone();

    let summary = match args.processor {
        ProcessorCommands::Echo { compute_delay_ms } => {
            let processor = EchoProcessor::new(Duration::from_millis(compute_delay_ms));
            run_worker(client, processor, config).await?
        }
        ProcessorCommands::Copy {
            source_dir,
            destination_dir,
        } => {
            let processor = CopyProcessor::create(source_dir, destination_dir).await?;
            run_worker(client, processor, config).await?
        }
        ProcessorCommands::Iotest { input_dir, ref_dir } => {
            let processor = IoTestProcessor::create(input_dir, ref_dir).await?;
            run_worker(client, processor, config).await?
        }
    };

    let output_path = summary
        .output_path
        .as_ref()
        .map(|p| p.display().to_string());
    match args.client.output {
        OutputFormat::Json => {
            let output = WorkOutput {
                job_id,
                batches_accepted: summary.batches_accepted,
                batches_rejected: summary.batches_rejected,
                batches_abandoned: summary.batches_abandoned,
                tokens_processed: summary.tokens_processed,
                output_path,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job ID:            {}", job_id);
            println!("Batches accepted:  {}", summary.batches_accepted);
            println!("Batches rejected:  {}", summary.batches_rejected);
            println!("Batches abandoned: {}", summary.batches_abandoned);
            println!("Tokens processed:  {}", summary.tokens_processed);
            if let Some(path) = output_path {
                println!("Results:           {}", path);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Admin { client, command } => {
            let grpc_client = connect(&client).await?;
            handle_admin(&grpc_client, command, &client.output).await?;
        }
        Commands::Work(work_args) => {
            handle_work(work_args).await?;
        }
    }

    Ok(())
}
