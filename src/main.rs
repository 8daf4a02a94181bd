use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use drover::agent::Agent;
use drover::config::{
    AgentConfig, CoordinatorConfig, ExecutorConfig, MonitorConfig, PipelineConfig,
};
use drover::coordinator::CoordinatorClient;
use drover::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(version)]
#[command(about = "A pull-based shell command execution agent")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the execution agent
    Agent(AgentArgs),

    /// Query coordinator health
    Health(HealthArgs),
}

// =============================================================================
// Agent Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct AgentArgs {
    /// Coordinator base URL
    #[arg(long, env = "DROVER_COORDINATOR_URL", default_value = "http://127.0.0.1:5000")]
    coordinator_url: String,

    /// Free-text description reported with every submitted result
    #[arg(long, env = "DROVER_DESCRIPTION", default_value = "unnamed drover agent")]
    description: String,

    /// Commands requested per fetch (the coordinator serves at most 50)
    #[arg(long, env = "DROVER_BATCH_SIZE", default_value = "10")]
    batch_size: usize,

    /// Wall-clock budget per command in seconds
    #[arg(long, env = "DROVER_COMMAND_TIMEOUT_SECS", default_value = "30")]
    command_timeout_secs: u64,

    /// Captured output cap per command in bytes
    #[arg(long, env = "DROVER_MAX_OUTPUT_BYTES", default_value = "65536")]
    max_output_bytes: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "DROVER_REQUEST_TIMEOUT_SECS", default_value = "10")]
    request_timeout_secs: u64,

    /// Attempts per fetch or submit before giving up
    #[arg(long, env = "DROVER_MAX_RETRIES", default_value = "3")]
    max_retries: u32,

    /// Pause between retry attempts in seconds
    #[arg(long, env = "DROVER_RETRY_DELAY_SECS", default_value = "10")]
    retry_delay_secs: u64,

    /// Pause between fetches while work is flowing, in seconds
    #[arg(long, env = "DROVER_FETCH_INTERVAL_SECS", default_value = "1")]
    fetch_interval_secs: u64,

    /// Pause after the coordinator reports no work, in seconds
    #[arg(long, env = "DROVER_IDLE_BACKOFF_SECS", default_value = "10")]
    idle_backoff_secs: u64,

    /// Cadence of the result submitter in seconds
    #[arg(long, env = "DROVER_SUBMIT_INTERVAL_SECS", default_value = "2")]
    submit_interval_secs: u64,

    /// Submit ticks a failed batch is retried before it is dropped
    #[arg(long, env = "DROVER_MAX_SUBMIT_ATTEMPTS", default_value = "3")]
    max_submit_attempts: u32,

    /// Capacity of the in-memory result buffer
    #[arg(long, env = "DROVER_BUFFER_CAPACITY", default_value = "100")]
    buffer_capacity: usize,

    /// Command batches allowed in flight at once
    #[arg(long, env = "DROVER_MAX_CONCURRENT_BATCHES", default_value = "2")]
    max_concurrent_batches: usize,

    /// Concurrent commands per batch
    #[arg(long, env = "DROVER_BATCH_WORKERS", default_value = "8")]
    batch_workers: usize,

    /// Host CPU ceiling in percent; crossing it stops the agent
    #[arg(long, env = "DROVER_MAX_CPU_PERCENT", default_value = "90")]
    max_cpu_percent: f64,

    /// Host memory ceiling in percent; crossing it stops the agent
    #[arg(long, env = "DROVER_MAX_MEMORY_PERCENT", default_value = "90")]
    max_memory_percent: f64,

    /// Pause between host resource checks in seconds
    #[arg(long, env = "DROVER_RESOURCE_CHECK_INTERVAL_SECS", default_value = "5")]
    resource_check_interval_secs: u64,
}

impl AgentArgs {
    fn into_config(self) -> AgentConfig {
        AgentConfig {
            coordinator: CoordinatorConfig {
                url: self.coordinator_url,
                description: self.description,
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                max_retries: self.max_retries,
                retry_delay: Duration::from_secs(self.retry_delay_secs),
            },
            executor: ExecutorConfig {
                command_timeout: Duration::from_secs(self.command_timeout_secs),
                max_output_bytes: self.max_output_bytes,
            },
            monitor: MonitorConfig {
                max_cpu_percent: self.max_cpu_percent,
                max_memory_percent: self.max_memory_percent,
                check_interval: Duration::from_secs(self.resource_check_interval_secs),
            },
            pipeline: PipelineConfig {
                batch_size: self.batch_size,
                fetch_interval: Duration::from_secs(self.fetch_interval_secs),
                idle_backoff: Duration::from_secs(self.idle_backoff_secs),
                submit_interval: Duration::from_secs(self.submit_interval_secs),
                max_submit_attempts: self.max_submit_attempts,
                buffer_capacity: self.buffer_capacity,
                max_concurrent_batches: self.max_concurrent_batches,
                batch_workers: self.batch_workers,
            },
        }
    }
}

// =============================================================================
// Health Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct HealthArgs {
    /// Coordinator base URL
    #[arg(long, env = "DROVER_COORDINATOR_URL", default_value = "http://127.0.0.1:5000")]
    coordinator_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "DROVER_REQUEST_TIMEOUT_SECS", default_value = "10")]
    request_timeout_secs: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Agent Implementation
// =============================================================================

async fn run_agent(args: AgentArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config();

    tracing::info!(
        coordinator_url = %config.coordinator.url,
        batch_size = config.pipeline.batch_size,
        max_concurrent_batches = config.pipeline.max_concurrent_batches,
        command_timeout_secs = config.executor.command_timeout.as_secs(),
        "Starting drover agent"
    );

    let stop = install_shutdown_handler();
    let agent = Agent::new(config)?;
    agent.run(stop).await;

    Ok(())
}

// =============================================================================
// Health Command Handler
// =============================================================================

async fn handle_health(args: HealthArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = CoordinatorConfig {
        url: args.coordinator_url.clone(),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        ..CoordinatorConfig::default()
    };
    let client = CoordinatorClient::new(config)?;

    match client.health().await {
        Ok(health) => match args.output {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&health)?);
            }
            OutputFormat::Table => {
                println!("Coordinator:        {}", args.coordinator_url);
                println!("Status:             {}", health.status);
                println!("Available commands: {}", health.available_commands);
                println!("Total results:      {}", health.total_results);
            }
        },
        Err(e) => {
            eprintln!("Error: health check failed: {}", e);
            std::process::exit(1);
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

    match args.command {
        Commands::Agent(agent_args) => {
            run_agent(agent_args).await?;
        }
        Commands::Health(health_args) => {
            handle_health(health_args).await?;
        }
    }

    Ok(())
}
