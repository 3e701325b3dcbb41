//! ServiceCraft CLI.
//!
//! Scores discovery assessments against the trigger rule set and drafts new
//! service-line blueprints for human review.

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
