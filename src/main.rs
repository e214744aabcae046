//! vmap-storage - operator tool for revisioned map storage

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vmap_storage::hashers::HasherRegistry;
use vmap_storage::storage::sqlite::schema;
use vmap_storage::tree::{HashStrategy, Tree};
use vmap_storage::{MapStorage, ReadOnlyMapTx, StorageConfig};

#[derive(Parser, Debug)]
#[command(name = "vmap-storage")]
#[command(about = "Inspect and maintain revisioned map storage")]
struct Args {
    /// Path to SQLite database
    #[arg(long, env = "VMAP_DATABASE_PATH", default_value = "./vmap.db")]
    database: String,

    /// Log level
    #[arg(long, env = "VMAP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or migrate the schema
    Init,

    /// Check that the database is reachable
    Check,

    /// Print the latest signed root of a map as JSON
    LatestRoot {
        /// Map tree id
        #[arg(long)]
        tree_id: i64,

        /// Hash strategy of the tree
        #[arg(long, default_value = "TEST_MAP_HASHER", value_parser = parse_hash_strategy)]
        hash_strategy: HashStrategy,

        /// Give up after this many milliseconds
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
    },
}

fn parse_hash_strategy(s: &str) -> Result<HashStrategy, String> {
    HashStrategy::parse(s).ok_or_else(|| format!("unknown hash strategy: {}", s))
}

/// JSON view of a signed map root
#[derive(Serialize, Debug)]
struct RootView {
    tree_id: i64,
    revision: u64,
    timestamp_nanos: u64,
    root_hash: String,
    metadata: String,
    signature: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = StorageConfig {
        path: args.database.clone(),
        ..StorageConfig::from_env()
    };

    match args.command {
        Command::Init => {
            let storage = MapStorage::open(config, HasherRegistry::with_defaults())
                .context("failed to open map storage")?;
            let conn = storage.pool().acquire()?;
            let version = schema::current_version(&conn)?;
            tracing::info!(path = %args.database, ?version, "schema ready");
        }
        Command::Check => {
            let storage = MapStorage::open(config, HasherRegistry::with_defaults())
                .context("failed to open map storage")?;
            storage
                .check_database_accessible()
                .context("database is not accessible")?;
            println!("ok");
        }
        Command::LatestRoot {
            tree_id,
            hash_strategy,
            timeout_ms,
        } => {
            let storage = MapStorage::open(config, HasherRegistry::with_defaults())
                .context("failed to open map storage")?;
            // The operator vouches for the tree; there is no metadata store to load it from.
            let tree = Tree::map(tree_id, hash_strategy, chrono::Utc::now());

            let signed = storage
                .snapshot_async(tree, Some(Duration::from_millis(timeout_ms)), |snapshot| {
                    snapshot.latest_signed_map_root()
                })
                .await;

            let signed = match signed {
                Err(e) if e.is_needs_init() => {
                    println!("{}", serde_json::json!({ "tree_id": tree_id, "needs_init": true }));
                    return Ok(());
                }
                other => other.context("failed to read latest root")?,
            };
            let root = signed.decode()?;

            let view = RootView {
                tree_id,
                revision: root.revision,
                timestamp_nanos: root.timestamp_nanos,
                root_hash: hex::encode(&root.root_hash),
                metadata: hex::encode(&root.metadata),
                signature: hex::encode(&signed.signature),
            };
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    Ok(())
}
