//! jupiter CLI
//!
//! Stores and queries documents in a local index directory.

use std::process;

use clap::{Parser, Subcommand};
use jupiter_index::config::WalSyncStrategy;
use jupiter_index::wal::WalRecovery;
use jupiter_index::{Config, DocumentIndex, FieldTokens};
use tracing_subscriber::{fmt, EnvFilter};

/// jupiter document index
#[derive(Parser, Debug)]
#[command(name = "jupiter")]
#[command(about = "Document store with an inverted token index")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, env = "JUPITER_DATADIR", default_value = "./jupiter_data")]
    data_dir: String,

    /// Maximum ingestions running at once
    #[arg(long, env = "JUPITER_MAX_CONCURRENT_INGESTS", default_value = "100")]
    max_concurrent_ingests: usize,

    /// Posting-list merge timeout in milliseconds
    #[arg(long, env = "JUPITER_MERGE_TIMEOUT_MS", default_value = "100")]
    merge_timeout_ms: u64,

    /// MemTable size limit in MB before flush
    #[arg(short = 'm', long, default_value = "64")]
    memtable_mb: usize,

    /// WAL size in MB that forces a flush
    #[arg(long, default_value = "64")]
    wal_mb: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a document with its tokens
    Store {
        /// Tokens of one field as name=tok1,tok2 (repeatable)
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, Vec<String>)>,

        /// The document, as JSON
        #[arg(long)]
        document: String,
    },

    /// Look up a document id or search for documents containing all terms
    Query {
        /// Query terms
        #[arg(required = true)]
        terms: Vec<String>,
    },

    /// Print the size of the data directory in bytes
    Du,

    /// Check the write-ahead log without modifying it
    VerifyWal,
}

fn parse_field(raw: &str) -> Result<(String, Vec<String>), String> {
    let (name, tokens) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=tok1,tok2, got {:?}", raw))?;

    let tokens = tokens
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Ok((name.to_string(), tokens))
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,jupiter_index=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .max_concurrent_ingests(args.max_concurrent_ingests)
        .merge_timeout_ms(args.merge_timeout_ms)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .wal_size_limit(args.wal_mb * 1024 * 1024)
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 100 })
        .build();

    if let Commands::VerifyWal = args.command {
        let wal_path = config.data_dir.join("wal.log");
        match WalRecovery::verify(&wal_path) {
            Ok(result) => println!("{:?}", result),
            Err(e) => {
                tracing::error!("Failed to verify {}: {}", wal_path.display(), e);
                process::exit(1);
            }
        }
        return;
    }

    let index = match DocumentIndex::open(config) {
        Ok(index) => index,
        Err(e) => {
            tracing::error!("Failed to open index: {}", e);
            process::exit(1);
        }
    };

    let outcome = match args.command {
        Commands::Store { fields, document } => store(&index, fields, &document),
        Commands::Query { terms } => index.retrieve(&terms.join(" ")).map_err(|e| e.to_string()),
        Commands::Du => index
            .dir_size()
            .map(|bytes| format!("{}", bytes))
            .map_err(|e| e.to_string()),
        Commands::VerifyWal => Ok(String::new()),
    };

    let closed = index.close();

    match outcome {
        Ok(output) => println!("{}", output),
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(1);
        }
    }

    if let Err(e) = closed {
        tracing::error!("Failed to close index: {}", e);
        process::exit(1);
    }
}

fn store(
    index: &DocumentIndex,
    fields: Vec<(String, Vec<String>)>,
    document: &str,
) -> Result<String, String> {
    let document: serde_json::Value =
        serde_json::from_str(document).map_err(|e| format!("invalid document JSON: {}", e))?;

    let mut tokens = FieldTokens::new();
    for (name, field_tokens) in fields {
        tokens.entry(name).or_default().extend(field_tokens);
    }

    index
        .store(&tokens, &document)
        .map(|id| id.to_string())
        .map_err(|e| e.to_string())
}
