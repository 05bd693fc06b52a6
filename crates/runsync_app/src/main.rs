mod cli;
mod config;
mod effects;
mod render;
mod session;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args).await?;
    // A pending stdin read would otherwise hold the runtime open on exit.
    std::process::exit(0);
}
