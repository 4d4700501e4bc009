//! MeetNews CLI: stores meeting records and enriches them with related news.
//!
//! Stands in for the web layer: it writes records, enqueues enrichment
//! on an in-process broker, and reads results back.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
