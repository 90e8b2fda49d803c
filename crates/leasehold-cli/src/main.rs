//! `leasehold` command line tool
//!
//! Runs a command while holding a fail-open lock in a DynamoDB lock table,
//! or prints the record currently stored for a lock.
//!
//! Client settings come from an optional config file overridden by
//! `LEASEHOLD__*` environment variables, e.g. `LEASEHOLD__TABLE=locks`.

mod commands;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use leasehold_client::{LockClient, LockClientConfig, LockClientSettings, LockId};
use leasehold_store::{DynamoDbConfig, DynamoDbLockStore};
use tracing::debug;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "leasehold", version, about)]
struct Cli {
    /// Client settings file (TOML, YAML or JSON)
    #[arg(short = 'c', long = "config", env = "LEASEHOLD_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// AWS region of the lock table
    #[arg(long = "region", env = "AWS_REGION", global = true)]
    region: Option<String>,
    /// DynamoDB endpoint override
    #[arg(long = "endpoint-url", env = "LEASEHOLD_DYNAMODB_ENDPOINT", global = true)]
    endpoint_url: Option<String>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Acquire the lock, run a command, release the lock
    Run {
        #[command(flatten)]
        lock: LockArgs,
        /// Command to run and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Print the stored lock record as JSON
    Inspect {
        #[command(flatten)]
        lock: LockArgs,
    },
}

#[derive(Debug, Args)]
struct LockArgs {
    /// Partition key value of the lock
    #[arg(long = "id")]
    id: String,
    /// Sort key value, for tables with a sort key
    #[arg(long = "sort-id")]
    sort_id: Option<String>,
}

impl LockArgs {
    fn lock_id(&self) -> LockId {
        match &self.sort_id {
            Some(sort) => LockId::structured(self.id.as_str(), sort.as_str()),
            None => LockId::from(self.id.as_str()),
        }
    }
}

async fn build_client(cli: &Cli) -> anyhow::Result<LockClient> {
    let settings = LockClientSettings::load(cli.config.as_deref())?;
    let config = LockClientConfig::try_from(settings)?;
    debug!(
        table = %config.table,
        partition_key = %config.partition_key,
        lease_ms = config.lease().as_millis() as u64,
        "Loaded client settings"
    );

    let store = DynamoDbLockStore::new(DynamoDbConfig {
        region: cli.region.clone(),
        endpoint: cli.endpoint_url.clone(),
    })
    .await;

    Ok(LockClient::new(Arc::new(store), config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let client = build_client(&cli).await?;
    let code = match &cli.command {
        Command::Run { lock, command } => commands::run(&client, lock.lock_id(), command).await?,
        Command::Inspect { lock } => commands::inspect(&client, lock.lock_id()).await?,
    };

    std::process::exit(code)
}
