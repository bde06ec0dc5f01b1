//! ANS9 Tools - claims spreadsheet filtering & courier cross-reference
//!
//! Filters claims workbooks by visa date and status term, and cross-references
//! them with the courier base to export out-of-term rows per notifier.

mod cli;
mod config;
mod data;
mod export;
mod pipeline;

use clap::Parser;
use cli::Args;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli::log_level(args.verbose)),
    )
    .init();

    cli::run(args)
}
