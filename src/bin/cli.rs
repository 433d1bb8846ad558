//! segkv CLI
//!
//! Command-line interface operating directly on a segkv data directory.

use clap::{Parser, Subcommand};
use segkv::{Config, Engine, SegKvError};
use tracing_subscriber::{fmt, EnvFilter};

/// segkv CLI
#[derive(Parser, Debug)]
#[command(name = "segkv")]
#[command(about = "Log-structured segment key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./segkv_data")]
    data_dir: String,

    /// Segment rollover threshold in bytes
    #[arg(short, long, default_value_t = segkv::config::DEFAULT_SEGMENT_SIZE_LIMIT)]
    segment_size: u64,

    /// fsync after every append
    #[arg(long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set (must not be empty)
        value: String,
    },

    /// Compact all segments except the active one
    Merge,

    /// Show segment files and key counts
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,segkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("segkv v{}", segkv::VERSION);

    if let Commands::Put { value, .. } = &args.command {
        if value.is_empty() {
            tracing::error!("can't save empty value");
            std::process::exit(1);
        }
    }

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .segment_size_limit(args.segment_size)
        .sync_writes(args.sync)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = run(&engine, args.command);
    let closed = engine.close();

    match outcome.and(closed) {
        Ok(()) => {}
        Err(SegKvError::KeyNotFound) => {
            eprintln!("not found");
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run(engine: &Engine, command: Commands) -> segkv::Result<()> {
    match command {
        Commands::Get { key } => {
            println!("{}", engine.get(&key)?);
        }
        Commands::Put { key, value } => {
            engine.put(&key, &value)?;
        }
        Commands::Merge => {
            let stats = engine.merge()?;
            println!(
                "merged {} segments, {} keys written, {} corrupt records dropped",
                stats.segments_merged, stats.keys_written, stats.corrupt_records_dropped
            );
        }
        Commands::Stats => {
            for path in engine.segment_paths() {
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                println!("{}\t{} bytes", path.display(), size);
            }
            println!("last segment number: {}", engine.last_segment_number());
        }
    }
    Ok(())
}
