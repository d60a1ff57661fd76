mod cli;
mod fixture;
mod replay;
mod script;
mod telemetry;

use std::io::Write;

use anyhow::Context;
use clap::Parser;

use crate::cli::Cli;
use crate::replay::Replay;
use crate::script::Script;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_config())?;

    let script = Script::load(&cli.script)?;
    let replay = Replay::new(&script, cli.engine_config())?;
    let mut reports = replay.run(&script.steps).await?;
    if cli.last {
        reports = reports.split_off(reports.len().saturating_sub(1));
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for report in &reports {
        if cli.compact {
            serde_json::to_writer(&mut out, report)?;
        } else {
            serde_json::to_writer_pretty(&mut out, report)?;
        }
        writeln!(out).context("writing report")?;
    }
    Ok(())
}
