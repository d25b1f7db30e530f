mod cli;
mod core;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "failcheck", about = "Failover cluster validation CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the latest metric sample for one or more scale sets
    Metrics {
        /// Scale set name (repeatable)
        #[arg(short, long = "scale-set", required = true)]
        scale_set: Vec<String>,

        /// Metric name
        #[arg(short, long)]
        metric: String,

        /// Metric namespace
        #[arg(short, long)]
        namespace: String,

        /// Aggregation (maximum|minimum|average|count|total)
        #[arg(short, long, default_value = "average")]
        aggregation: String,
    },
    /// Poll metric definitions until they are stably published
    WaitMetric {
        /// Scale set name (repeatable)
        #[arg(short, long = "scale-set", required = true)]
        scale_set: Vec<String>,

        /// Metric name
        #[arg(short, long)]
        metric: String,

        /// Metric namespace
        #[arg(short, long)]
        namespace: String,

        /// Seconds between polls
        #[arg(long, default_value_t = 5)]
        period: u64,

        /// Consecutive successes required; also the error budget
        #[arg(long, default_value_t = 10)]
        attempts: u32,

        /// Overall deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Enumerate the deployment vault and verify validator-key secrets
    Secrets,
    /// Manage monitoring notification channels
    Channels {
        #[command(subcommand)]
        action: ChannelAction,
    },
    /// Provision, validate, and tear down a full failover deployment
    E2e {
        /// Target platform (azure|gcp)
        #[arg(long, default_value = "gcp")]
        platform: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ChannelAction {
    /// Delete notification channels matching the naming prefix
    Clean {
        /// List matching channels without deleting them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "failcheck=debug" } else { "failcheck=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_opts = cli::output::OutputOptions::resolve(
        cli.format.as_deref(),
        cli.json,
        cli.pretty,
        cli.no_color,
        cli.verbose,
    );

    match cli.command {
        Commands::Metrics {
            scale_set,
            metric,
            namespace,
            aggregation,
        } => {
            cli::metrics_cmd::run(scale_set, metric, namespace, aggregation, &output_opts).await?;
        }
        Commands::WaitMetric {
            scale_set,
            metric,
            namespace,
            period,
            attempts,
            timeout,
        } => {
            cli::wait_cmd::run(
                scale_set,
                metric,
                namespace,
                period,
                attempts,
                timeout,
                &output_opts,
            )
            .await?;
        }
        Commands::Secrets => cli::secrets_cmd::run(&output_opts).await?,
        Commands::Channels { action } => match action {
            ChannelAction::Clean { dry_run } => {
                cli::channels_cmd::clean(dry_run, &output_opts).await?
            }
        },
        Commands::E2e { platform } => cli::e2e_cmd::run(platform, &output_opts).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
        },
    }

    Ok(())
}
