//! Spyglasses command line interface.
//!
//! Classifies user agents and referrers against the active pattern
//! dataset and triggers dataset syncs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use spyglasses::{DetectionResult, SpyglassesClient, SpyglassesConfig};
use std::path::PathBuf;
use tracing::{warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "spyglasses")]
#[command(author, version, about = "AI and bot traffic detection")]
struct Args {
    /// Path to configuration file (JSON or YAML); environment variables
    /// are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a user agent and referrer against the active dataset
    Detect {
        /// User-Agent header value
        #[arg(long, default_value = "")]
        user_agent: String,

        /// Referer header value
        #[arg(long, default_value = "")]
        referrer: String,
    },

    /// Fetch the latest pattern dataset from the patterns endpoint
    Sync,
}

fn init_logging(json: bool, level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, &args.log_level);

    let config = match &args.config {
        Some(path) => SpyglassesConfig::from_file(path)?,
        None => SpyglassesConfig::from_env(),
    };

    let client = SpyglassesClient::new(config).await?;

    match args.command {
        Command::Detect {
            user_agent,
            referrer,
        } => {
            if client.config().api_key().is_none() {
                warn!("No API key configured, detection is disabled");
            }

            match client.detect(&user_agent, &referrer) {
                DetectionResult::None => println!("no match"),
                DetectionResult::Bot {
                    should_block,
                    matched_pattern,
                    info,
                } => {
                    println!(
                        "bot: {} [{} / {}] matched {} block={}",
                        info.agent_type,
                        info.category,
                        info.subcategory,
                        matched_pattern,
                        should_block
                    );
                }
                DetectionResult::AiReferrer {
                    matched_pattern,
                    info,
                } => {
                    println!(
                        "ai referrer: {} ({}) matched {}",
                        info.name, info.company, matched_pattern
                    );
                }
            }
        }
        Command::Sync => {
            let report = client.sync().await?;
            println!(
                "synced {} patterns, {} ai referrers (version {})",
                report.patterns, report.ai_referrers, report.version
            );
        }
    }

    Ok(())
}
