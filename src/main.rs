//! `vodplay` CLI - browse the catalog and play its HLS streams

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cmd::{cmd_info, cmd_list, cmd_play, PlayOptions};

#[derive(Parser)]
#[command(name = "vodplay")]
#[command(about = "Adaptive HLS player for a video catalog")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/vodplay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog API base URL
    #[arg(long, global = true, env = "VODPLAY_CATALOG")]
    catalog: Option<String>,

    /// Bearer token for the catalog
    #[arg(long, global = true, env = "VODPLAY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List videos in the catalog
    List,

    /// Show details and the stream location of one video
    Info {
        /// Catalog id
        id: String,
    },

    /// Play a catalog video or a direct .m3u8 URL
    Play {
        /// Catalog id or http(s) manifest URL
        target: String,

        /// Write the stream to a file, or `-` for stdout (default)
        #[arg(short, long)]
        output: Option<String>,

        /// Hand the URL to an external player (mpv, vlc, ffplay, iina)
        #[arg(short, long)]
        player: Option<String>,

        /// Use the first external player found on PATH
        #[arg(long, conflicts_with = "output")]
        native: bool,

        /// Stop after this many seconds of media
        #[arg(short, long)]
        duration: Option<u64>,

        /// Quality: best, worst, or a height such as 720
        #[arg(short, long)]
        quality: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for media output
    let default_level = if cli.verbose { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let mut config = match &cli.config {
        Some(path) => vodplay::config::load_from(path)?,
        None => vodplay::config::load()?,
    };
    if let Some(base) = cli.catalog {
        config.catalog.base_url = base;
    }
    if cli.token.is_some() {
        config.catalog.token = cli.token;
    }

    match cli.command {
        Commands::List => cmd_list(&config).await?,
        Commands::Info { id } => cmd_info(&config, &id).await?,
        Commands::Play {
            target,
            output,
            player,
            native,
            duration,
            quality,
        } => {
            if let Some(quality) = quality {
                config.engine.quality = quality;
            }
            let options = PlayOptions {
                output,
                player,
                native,
                duration,
            };
            cmd_play(&config, &target, &options).await?;
        }
    }

    Ok(())
}
