//! Command-line scenario runner for the loan manager
//!
//! Usage:
//!   lmctl run <SCENARIO> [--at <TS>] [--events] [--snapshot <PATH>]
//!   lmctl validate <SNAPSHOT>
//!
//! Examples:
//!   # Replay every event and print the final report
//!   lmctl run scenario.json
//!
//!   # Stop after events at or before a timestamp and report there
//!   lmctl run scenario.json --at 1700000500 --events
//!
//!   # Check a saved snapshot
//!   lmctl validate snapshot.json

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use loan_manager_core::orchestrator::validate_snapshot;
use loan_manager_core::{PortfolioSnapshot, Scenario, ScenarioRunner};
use serde::de::DeserializeOwned;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "lmctl")]
#[command(about = "Replay loan lifecycle scenarios and inspect portfolio snapshots")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a scenario file and print the portfolio report as JSON
    Run {
        /// Scenario file (JSON)
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Only execute events at or before this timestamp and report there
        #[arg(long, value_name = "TS")]
        at: Option<u64>,

        /// Include the event log in the output
        #[arg(long)]
        events: bool,

        /// Write the final portfolio snapshot to this path
        #[arg(long, value_name = "PATH")]
        snapshot: Option<PathBuf>,
    },

    /// Check a snapshot file's integrity
    Validate {
        /// Snapshot file (JSON)
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let value = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
    Ok(value)
}

fn run(
    scenario_path: &Path,
    at: Option<u64>,
    events: bool,
    snapshot_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario: Scenario = read_json(scenario_path)?;
    let mut runner = ScenarioRunner::new(scenario)?;

    let report = match at {
        Some(timestamp) => {
            runner.run_until(timestamp)?;
            runner.report(timestamp)
        }
        None => runner.run()?,
    };

    if let Some(path) = snapshot_path {
        let snapshot = runner.manager().snapshot()?;
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
    }

    let output = if events {
        json!({
            "report": report,
            "events": runner.manager().event_log().events(),
        })
    } else {
        json!({ "report": report })
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn validate(snapshot_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot: PortfolioSnapshot = read_json(snapshot_path)?;
    validate_snapshot(&snapshot)?;

    let output = json!({
        "valid": true,
        "config_hash": snapshot.config_hash,
        "payments": snapshot.payments.len(),
        "linked": snapshot.payments.iter().filter(|p| p.node.is_some()).count(),
        "impaired": snapshot.impairments.len(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            scenario,
            at,
            events,
            snapshot,
        } => run(&scenario, at, events, snapshot.as_deref()),
        Command::Validate { snapshot } => validate(&snapshot),
    }
}
