//! tidewire: command-line front end for the gateway.
//!
//! Resolves conditions for one or more points and prints the
//! provenance-tagged results as JSON.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tidewire::{ConditionsRequest, SyntheticConditions, SyntheticProvider, Tidewire};

/// Tidewire gateway CLI
#[derive(Parser)]
#[command(name = "tidewire")]
#[command(version)]
#[command(about = "Resilient marine data gateway")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "TIDEWIRE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve conditions through the provider chain
    Conditions {
        /// Point as LAT,LON (repeatable)
        #[arg(long = "at", required = true, allow_hyphen_values = true)]
        points: Vec<ConditionsRequest>,
        /// Fail instead of falling back to stale or synthetic data
        #[arg(long)]
        live: bool,
    },

    /// Print the synthetic conditions for a point without any network call
    Synthetic {
        /// Point as LAT,LON
        #[arg(long = "at", allow_hyphen_values = true)]
        point: ConditionsRequest,
    },

    /// Fetch a URL through cache, breaker and retry
    Fetch {
        url: String,
        /// Breaker service name
        #[arg(short, long, default_value = "weather")]
        service: String,
        /// Body to return if every attempt fails
        #[arg(long)]
        fallback: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    // Needs no gateway
    if let Command::Synthetic { point } = &args.command {
        let conditions = SyntheticConditions.generate(point, Utc::now());
        println!("{}", serde_json::to_string_pretty(&conditions)?);
        return Ok(());
    }

    let gateway = Tidewire::builder()
        .config_file(args.config.as_deref())?
        .build()?;

    match args.command {
        Command::Conditions { points, live } => {
            if live {
                let mut results = Vec::with_capacity(points.len());
                for point in &points {
                    results.push(gateway.conditions_live(point).await?);
                }
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                let results = gateway.conditions_batch(points).await;
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
        }

        Command::Fetch {
            url,
            service,
            fallback,
        } => {
            let mut request = gateway.request(url);
            if let Some(fallback) = fallback {
                request = request.with_fallback_value(fallback);
            }
            let response = gateway.fetch(&request, &service).await?;
            println!("{}", response.body);
        }

        Command::Synthetic { .. } => {}
    }

    gateway.close();
    Ok(())
}
