//! # rumstat CLI Module
//!
//! ## Available Commands
//!
//! - `report` - Run a named report over a bundle file
//! - `facets` - Compute built-in facets and series over a bundle file
//! - `confidence` - Score two conversion samples
//! - `server` - Start the HTTP server

mod commands;

use clap::{Parser, Subcommand};
use rumstat::config::RumConfig;
use rumstat_core::{ReportKind, RumError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// rumstat - aggregate real-user-monitoring bundles
///
/// Groups weighted page-view bundles by facets, folds series into
/// sum/count/min/max aggregates, and scores A/B tests.
#[derive(Parser, Debug)]
#[command(name = "rumstat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a report over a bundle file
    Report {
        /// Report to run (experiment, rageclick, url-groups)
        #[arg(short, long)]
        kind: ReportKind,

        /// Bundle file: a JSON array or {"rumBundles": [...]}
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Compute built-in facets and series over a bundle file
    Facets {
        /// Bundle file: a JSON array or {"rumBundles": [...]}
        #[arg(short, long)]
        file: PathBuf,

        /// Facet to compute (repeatable)
        #[arg(long = "facet")]
        facets: Vec<String>,

        /// Series to aggregate (repeatable)
        #[arg(long = "series")]
        series: Vec<String>,

        /// Facet values to print per facet (text output only)
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Confidence that two conversion rates differ
    Confidence {
        control_conversions: f64,
        control_samples: f64,
        test_conversions: f64,
        test_samples: f64,
    },

    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), RumError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Report { kind, file }) => {
            let config = RumConfig::load(cli.config.as_deref())?;
            cmd_report(&config, json_mode, kind, &file)
        }
        Some(Commands::Facets {
            file,
            facets,
            series,
            top,
        }) => cmd_facets(json_mode, &file, facets, series, top),
        Some(Commands::Confidence {
            control_conversions,
            control_samples,
            test_conversions,
            test_samples,
        }) => {
            cmd_confidence(
                json_mode,
                control_conversions,
                control_samples,
                test_conversions,
                test_samples,
            );
            Ok(())
        }
        Some(Commands::Server { host, port }) => {
            let mut config = RumConfig::load(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(config).await
        }
        None => {
            use clap::CommandFactory;
            Cli::command()
                .print_help()
                .map_err(|e| RumError::IoError(e.to_string()))
        }
    }
}
