//! PromptForge CLI — prompt ambiguity analysis and enrichment.
//!
//! Detects gaps in master prompts and fills them with material from a
//! local prompt library, optionally refined by an external judge.

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
