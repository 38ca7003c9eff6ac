// SPDX-License-Identifier: MIT OR Apache-2.0
//! `flowgraph` - command line front end for the node graph engine.
//!
//! Loads graph files built from the calculator node set, checks them and
//! evaluates them on the background worker.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "flowgraph_cli=info,flowgraph_core=info";

#[derive(Parser, Debug)]
#[command(name = "flowgraph", version, about = "Evaluate node graph files")]
struct Args {
    /// Engine settings file (RON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a graph file and print the result as JSON
    Evaluate {
        /// Graph file (JSON)
        file: PathBuf,
    },
    /// Report node and edge counts, cycles and output node status
    Check {
        /// Graph file (JSON)
        file: PathBuf,
    },
    /// Write the calculator example graph to a file
    Demo {
        /// Destination file (JSON)
        file: PathBuf,
    },
}

fn run(args: Args) -> commands::Result<bool> {
    let config = commands::load_config(args.config.as_deref())?;

    match args.command {
        Command::Evaluate { file } => {
            let outputs = commands::evaluate(&file, &config)?;
            match serde_json::to_string_pretty(&outputs) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!("Failed to format result: {e}"),
            }
            Ok(true)
        }
        Command::Check { file } => {
            let report = commands::check(&file, &config)?;
            println!("{report}");
            Ok(report.is_ok())
        }
        Command::Demo { file } => {
            commands::demo(&file)?;
            Ok(true)
        }
    }
}

fn main() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting flowgraph v{}", env!("CARGO_PKG_VERSION"));

    match run(Args::parse()) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}
