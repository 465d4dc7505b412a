// main.rs — arg parsing and reporting only.
// All HTTP and policy lives in the modules below; main.rs wires them together.
mod client;
mod config;
mod plex;
mod poll;
mod updater;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;

use client::ApiClient;
use config::{Cli, UpdaterConfig};
use updater::RunSummary;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }
    let config: UpdaterConfig = cli.into();

    let client = ApiClient::new(&config.host, &config.api_key)?;

    // Mandatory preflight: authenticate before touching any app.
    let version = client
        .ping()
        .with_context(|| format!("preflight against {} failed", config.host))?;
    println!("connected to {} ({version})", config.host);

    let summary =
        updater::run(&client, &config).context("aborting: application listing unavailable")?;
    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let updated = format!("{} updated", summary.updated).green();
    let skipped = format!("{} skipped", summary.skipped).yellow();
    let failed = if summary.failed > 0 {
        format!("{} failed", summary.failed).red()
    } else {
        format!("{} failed", summary.failed).normal()
    };
    let heading = if summary.dry_run { "dry run: " } else { "" };
    println!();
    println!(
        "{heading}{} processed: {updated}, {} up to date, {skipped}, {failed}",
        summary.processed, summary.up_to_date
    );
}
