use bankcore::application::bank::{Backends, Bank};
use bankcore::config::BankConfig;
use bankcore::interfaces::csv::account_writer::AccountWriter;
use bankcore::interfaces::csv::operation_reader::OperationReader;
use bankcore::logging;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Redis URL for the shared idempotency cache (optional).
    #[arg(long)]
    redis_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BankConfig::from_env().into_diagnostic()?;
    logging::init(&config.log_filter, config.log_json);

    #[allow(unused_mut)]
    let mut backends = Backends::in_memory(&config);

    if let Some(db_path) = cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            use bankcore::infrastructure::rocksdb::RocksDBStore;
            use std::sync::Arc;

            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            backends.ledger = Arc::new(store.clone());
            backends.users = Arc::new(store.clone());
            backends.otps = Arc::new(store);
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }

    if let Some(redis_url) = cli.redis_url {
        #[cfg(feature = "cache-redis")]
        {
            use bankcore::domain::ports::CacheStoreRef;
            use bankcore::infrastructure::cache::{FallbackCache, LocalCache};
            use bankcore::infrastructure::redis::RedisCache;
            use std::sync::Arc;
            use std::time::Duration;

            let local = LocalCache::new(config.local_cache_capacity, config.idempotency_ttl);
            backends.cache = match RedisCache::connect(&redis_url, Duration::from_secs(2)).await {
                Ok(redis) => {
                    let primary: CacheStoreRef = Arc::new(redis);
                    Arc::new(FallbackCache::new(Some(primary), local))
                }
                Err(e) => {
                    eprintln!("WARNING: Could not connect to Redis ({e}). Using the local cache only.");
                    Arc::new(FallbackCache::local_only(local))
                }
            };
        }
        #[cfg(not(feature = "cache-redis"))]
        {
            let _ = redis_url;
            eprintln!(
                "WARNING: Shared cache requested via --redis-url, but 'cache-redis' feature is not enabled. Falling back to the local cache."
            );
        }
    }

    let bank = Bank::new(backends, &config);

    // Process operations
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for op_result in reader.operations() {
        match op_result {
            Ok(op) => {
                if let Err(e) = bank.execute(op).await {
                    eprintln!("Error processing operation: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {}", e);
            }
        }
    }

    let accounts = bank.engine().accounts().await.into_diagnostic()?;

    // Output final state
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;

    Ok(())
}
