//! # rumstat
//!
//! Command-line and HTTP front end for `rumstat-core`.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             apps/rumstat (THE BINARY)       │
//! │                                             │
//! │   ┌──────────┐          ┌──────────────┐    │
//! │   │   CLI    │          │   HTTP API   │    │
//! │   │  (clap)  │          │   (axum)     │    │
//! │   └────┬─────┘          └──────┬───────┘    │
//! │        └──────────┬────────────┘            │
//! │                   ▼                         │
//! │           ┌───────────────┐                 │
//! │           │ rumstat-core  │                 │
//! │           │  (THE LOGIC)  │                 │
//! │           └───────────────┘                 │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! rumstat report --kind rageclick --file bundles.json
//! rumstat facets --file bundles.json --facet url --series pageViews
//! rumstat confidence 10 500 25 500
//! rumstat --config rumstat.toml server --port 8080
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // RUMSTAT_LOG_FORMAT=json switches to machine-parseable logs.
    let log_format = std::env::var("RUMSTAT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rumstat=info,rumstat_core=info,tower_http=debug".into());

    // Logs go to stderr so report output on stdout stays pipeable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  rumstat v{}
  bundles -> facets -> aggregates
"#,
        env!("CARGO_PKG_VERSION")
    );
}
