use clap::{Parser, Subcommand, ValueEnum};
use dualboard::config::Config;
use dualboard::io::fixture::FixtureConnector;
use dualboard::model::{EntityType, Origin};
use dualboard::{DualSource, Result, SyncError};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    init_logging()?;
    let config = cli.connection.resolve(Config::from_env());
    let source = DualSource::from_config(&config, &FixtureConnector);

    match cli.command {
        Command::Engineers => print_json(&source.get_all_engineers().await),
        Command::Tasks => print_json(&source.get_all_tasks().await),
        Command::Counts => print_json(&source.get_task_counts().await),
        Command::Feed => print_json(&source.get_all_feed().await),
        Command::Watch { entity } => watch(&source, entity.into()).await,
    }
}

async fn watch(source: &DualSource, entity: EntityType) -> Result<()> {
    let handle = source
        .subscribe(entity, |records| {
            if let Err(error) = print_json(&records) {
                eprintln!("error: {error}");
            }
        })
        .await;
    tokio::signal::ctrl_c().await?;
    handle.dispose();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| SyncError::Logging(error.to_string()))
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Aggregate engineers, tasks, and feed items across both partitions."
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print engineers from both partitions.
    Engineers,
    /// Print tasks from both partitions.
    Tasks,
    /// Print task status counts per partition and in total.
    Counts,
    /// Print the 50 newest feed items.
    Feed,
    /// Print a fresh snapshot whenever either partition changes, until Ctrl-C.
    Watch {
        #[arg(value_enum)]
        entity: WatchTarget,
    },
}

/// Connection overrides. Unset flags fall back to the environment.
#[derive(clap::Args)]
struct ConnectionArgs {
    /// Endpoint of partition A (a fixture path or file:// URL).
    #[arg(long, global = true)]
    alec_endpoint: Option<String>,

    /// Key for partition A.
    #[arg(long, global = true)]
    alec_key: Option<String>,

    /// Endpoint of partition B (a fixture path or file:// URL).
    #[arg(long, global = true)]
    nate_endpoint: Option<String>,

    /// Key for partition B.
    #[arg(long, global = true)]
    nate_key: Option<String>,
}

impl ConnectionArgs {
    fn resolve(self, mut config: Config) -> Config {
        let overrides = [
            (Origin::Alec, self.alec_endpoint, self.alec_key),
            (Origin::Nate, self.nate_endpoint, self.nate_key),
        ];
        for (origin, endpoint, key) in overrides {
            let partition = config.partition_mut(origin);
            if let Some(endpoint) = endpoint {
                partition.endpoint = endpoint;
            }
            if let Some(key) = key {
                partition.key = key;
            }
        }
        config
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum WatchTarget {
    Engineers,
    Tasks,
    Feed,
}

impl From<WatchTarget> for EntityType {
    fn from(target: WatchTarget) -> Self {
        match target {
            WatchTarget::Engineers => EntityType::Engineers,
            WatchTarget::Tasks => EntityType::Tasks,
            WatchTarget::Feed => EntityType::Feed,
        }
    }
}
