//! Hansard CLI: build a queryable corpus of parliamentary transcripts.
//!
//! `sync` mirrors the remote index and retrieves changed transcripts;
//! `normalize` rebuilds the corpus tables from the retrieved markup.

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
