//! imgshard - concurrent, bounded, retry-aware shard image downloader.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "imgshard")]
#[command(about = "Download and transform images from sharded URL datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (default: ./imgshard.toml or the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Download and transform images from a directory of input shards
    Download(cmd::download::DownloadArgs),
    /// Show the resolved configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Download(args) => cmd::download::run(args, &config),
        Command::Config => {
            let downloader = config.to_downloader_config()?;
            println!("Configuration:");
            println!("  Threads per shard: {}", downloader.thread_count);
            println!("  Output folder: {}", downloader.output_folder.display());
            println!("  URL column: {}", downloader.url_column);
            println!("  Caption column: {:?}", downloader.caption_column);
            println!("  Timeout: {}s", downloader.timeout);
            println!("  Retries: {}", downloader.retries);
            println!("  Samples per shard: {}", downloader.samples_per_shard);
            println!("  Shard count order of magnitude: {}", downloader.shard_count_oom);
            println!("  Compute hash: {:?}", downloader.compute_hash);
            println!("  Verify hash type: {:?}", downloader.verify_hash_type);
            println!("  Encode format: {}", downloader.encode_format);
            Ok(())
        }
    }
}
