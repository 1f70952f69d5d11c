use clap::{Parser, ValueEnum};
use std::net::IpAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use testq::client::DispatchClient;
use testq::config::{
    ClientConfig, ExecutorConfig, ServerConfig, WorkerConfig, DEFAULT_SERVER_URL,
};
use testq::error::QueueError;
use testq::scheduler::{JobStatus, SubmitJobRequest, Target};
use testq::server::Server;
use testq::shutdown::install_shutdown_handler;
use testq::worker::{JobExecutor, Worker};

#[derive(Parser, Debug)]
#[command(name = "testq")]
#[command(version)]
#[command(about = "A distributed test-execution queue")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the dispatch server
    Server(ServerArgs),

    /// Start a worker that claims and runs queued tests
    Worker(WorkerArgs),

    /// Submit a new test job
    Submit {
        #[command(flatten)]
        client: ClientArgs,

        #[command(flatten)]
        job: SubmitArgs,
    },

    /// Check the status of a job
    Status {
        #[command(flatten)]
        client: ClientArgs,

        /// The job ID (UUID)
        #[arg(long)]
        job_id: String,
    },

    /// List all jobs
    List {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Show queued jobs grouped by app version
    Debug {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Check that the server is up
    Health {
        #[command(flatten)]
        client: ClientArgs,
    },
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Retries granted to each job after a failed run
    #[arg(long, default_value = "2")]
    max_retries: u32,
}

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = DEFAULT_SERVER_URL)]
    addr: String,

    /// Identifier reported with each claim (defaults to worker-<pid>)
    #[arg(long)]
    worker_id: Option<String>,

    /// Consecutive empty polls before the worker exits
    #[arg(long, default_value = "5")]
    max_idle_cycles: u32,

    /// Delay after an empty poll, in milliseconds
    #[arg(long, default_value = "2000")]
    poll_interval_ms: u64,

    /// Shell command that runs one test; the test path is appended.
    /// Without it, test runs are simulated.
    #[arg(long)]
    command: Option<String>,

    /// Probability that a simulated test passes
    #[arg(long, default_value = "0.5", conflicts_with = "command")]
    pass_rate: f64,

    /// Duration of a simulated test run, in milliseconds
    #[arg(long, default_value = "3000", conflicts_with = "command")]
    simulate_ms: u64,
}

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = DEFAULT_SERVER_URL)]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Parser, Debug)]
struct SubmitArgs {
    /// Organization ID
    #[arg(long)]
    org_id: String,

    /// App version ID
    #[arg(long)]
    app_version_id: String,

    /// Path to the test file
    #[arg(long)]
    test: String,

    /// Job priority (lower runs sooner)
    #[arg(long, default_value = "1", allow_negative_numbers = true)]
    priority: i64,

    /// Where the test runs
    #[arg(long, default_value = "device")]
    target: TargetArg,

    /// Wait for the job to reach a terminal status
    #[arg(long, overrides_with = "no_wait")]
    wait: bool,

    /// Return as soon as the job is queued
    #[arg(long)]
    no_wait: bool,

    /// Delay between status polls while waiting, in milliseconds
    #[arg(long, default_value = "3000")]
    poll_interval_ms: u64,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
    Device,
    Emulator,
    Browserstack,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Device => Target::Device,
            TargetArg::Emulator => Target::Emulator,
            TargetArg::Browserstack => Target::BrowserStack,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn client(args: &ClientArgs, poll_interval: Option<Duration>) -> Result<DispatchClient, QueueError> {
    let mut config = ClientConfig::new(args.addr.clone());
    if let Some(poll_interval) = poll_interval {
        config.poll_interval = poll_interval;
    }
    DispatchClient::new(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Report a failed command and exit non-zero.
fn fail(context: &str, err: QueueError) -> ! {
    eprintln!("Error: {}: {}", context, err);
    std::process::exit(1);
}

// =============================================================================
// Server and worker
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = ServerConfig::bind(args.bind, args.port).with_max_retries(args.max_retries);

    tracing::info!(
        listen_addr = %config.listen_addr,
        max_retries = config.max_retries,
        "Starting testq server (state is in-memory only)"
    );

    let shutdown = install_shutdown_handler();
    Server::new(config).run(shutdown).await?;
    Ok(())
}

async fn run_worker(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let executor = match args.command {
        Some(command) => ExecutorConfig::Command { command },
        None => ExecutorConfig::Simulated {
            duration: Duration::from_millis(args.simulate_ms),
            pass_rate: args.pass_rate,
        },
    };
    let mut config = WorkerConfig::default()
        .with_server_url(args.addr)
        .with_max_idle_cycles(args.max_idle_cycles)
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
        .with_executor(executor);
    if let Some(worker_id) = args.worker_id {
        config.worker_id = worker_id;
    }

    let executor = JobExecutor::new(config.executor.clone());
    let shutdown = install_shutdown_handler();

    Worker::connect(config, executor)?.run(shutdown).await?;
    println!("Worker is shutting down. Goodbye.");
    Ok(())
}

// =============================================================================
// Client command handlers
// =============================================================================

async fn handle_submit(
    client_args: &ClientArgs,
    job: SubmitArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let wait = !job.no_wait || job.wait;
    let client = client(client_args, Some(Duration::from_millis(job.poll_interval_ms)))?;
    let request = SubmitJobRequest::new(job.org_id, job.app_version_id.clone(), job.test.clone())
        .with_priority(job.priority)
        .with_target(job.target.into());

    let job_id = match client.submit(&request).await {
        Ok(job_id) => job_id,
        Err(e) => fail("job submission failed", e),
    };

    if let OutputFormat::Table = client_args.output {
        println!("Success! Job submitted: {}", job_id);
    }
    if !wait {
        if let OutputFormat::Json = client_args.output {
            print_json(&serde_json::json!({ "job_id": job_id }))?;
        }
        return Ok(());
    }

    if let OutputFormat::Table = client_args.output {
        println!(
            "Waiting for job {} | App Version: {} | Priority: {} | Test: {}",
            job_id, job.app_version_id, job.priority, job.test
        );
    }
    let output = client_args.output.clone();
    let result = client
        .wait_for_terminal(&job_id.to_string(), |current| {
            if let OutputFormat::Table = output {
                println!("Job status: {}", current.status);
            }
        })
        .await;

    let last = match result {
        Ok(last) => last,
        Err(e) => fail("could not follow job", e),
    };

    match client_args.output {
        OutputFormat::Json => print_json(&last)?,
        OutputFormat::Table => match last.status {
            JobStatus::Passed => println!("Success! Test passed."),
            _ => println!(
                "Sorry! Test failed after {} retries.",
                last.retries
            ),
        },
    }
    if last.status == JobStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn handle_status(
    client_args: &ClientArgs,
    job_id: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = client(client_args, None)?;
    let status = match client.status(&job_id).await {
        Ok(status) => status,
        Err(e) => fail("could not fetch job status", e),
    };

    match client_args.output {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!("Job ID:      {}", status.job_id);
            println!("Status:      {}", status.status);
            println!("Priority:    {}", status.priority);
            println!("Test:        {}", status.test_path);
            println!("Target:      {}", status.target);
            println!("App Version: {}", status.app_version_id);
            println!("Retries:     {}/{}", status.retries, status.max_retries);
            if let Some(worker) = &status.claimed_by {
                println!("Worker:      {}", worker);
            }
        }
    }
    Ok(())
}

async fn handle_list(client_args: &ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = client(client_args, None)?;
    let jobs = match client.list().await {
        Ok(jobs) => jobs,
        Err(e) => fail("could not list jobs", e),
    };

    match client_args.output {
        OutputFormat::Json => print_json(&jobs)?,
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("No jobs found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<8} {:<4} {:<7} {:<12} TEST",
                "JOB ID", "STATUS", "PRI", "RETRY", "TARGET"
            );
            println!("{}", "-".repeat(90));
            for job in &jobs {
                println!(
                    "{:<38} {:<8} {:<4} {:<7} {:<12} {}",
                    job.id,
                    job.status,
                    job.priority,
                    format!("{}/{}", job.retries, job.max_retries),
                    job.target,
                    job.test_path
                );
            }
            println!();
            println!("{} jobs", jobs.len());
        }
    }
    Ok(())
}

async fn handle_debug(client_args: &ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = client(client_args, None)?;
    let groups = match client.debug().await {
        Ok(groups) => groups,
        Err(e) => fail("could not fetch queued jobs", e),
    };

    match client_args.output {
        OutputFormat::Json => print_json(&groups)?,
        OutputFormat::Table => {
            if groups.is_empty() {
                println!("No jobs submitted yet.");
            }
            for (app_version_id, jobs) in &groups {
                println!("App version {} ({} queued)", app_version_id, jobs.len());
                for job in jobs {
                    println!(
                        "  {}  priority={}  retries={}/{}",
                        job.job_id, job.priority, job.retries, job.max_retries
                    );
                }
            }
        }
    }
    Ok(())
}

async fn handle_health(client_args: &ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = client(client_args, None)?;
    let health = match client.health().await {
        Ok(health) => health,
        Err(e) => fail("server is not healthy", e),
    };

    match client_args.output {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("Status:  {}", health.status);
            println!(
                "Jobs:    {} queued, {} running, {} passed, {} failed",
                health.jobs.queued, health.jobs.running, health.jobs.passed, health.jobs.failed
            );
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
        Commands::Server(server_args) => run_server(server_args).await?,
        Commands::Worker(worker_args) => run_worker(worker_args).await?,
        Commands::Submit { client, job } => handle_submit(&client, job).await?,
        Commands::Status { client, job_id } => handle_status(&client, job_id).await?,
        Commands::List { client } => handle_list(&client).await?,
        Commands::Debug { client } => handle_debug(&client).await?,
        Commands::Health { client } => handle_health(&client).await?,
    }

    Ok(())
}
