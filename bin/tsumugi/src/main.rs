use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cdm;
mod commands;
mod config;

#[derive(Parser, Debug)]
#[clap(name = "tsumugi", version, about)]
struct TsumugiArgs {
    /// Print debug logs
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Configuration file. Flags override its values.
    #[clap(short, long, global = true, default_value = "tsumugi.toml")]
    config: PathBuf,

    #[clap(subcommand)]
    command: commands::TsumugiCommand,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = TsumugiArgs::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("tsumugi={level},tsumugi_crunchyroll={level}"))
        }))
        .init();

    let config = config::Config::load(&args.config)?;
    args.command.run(config).await
}
