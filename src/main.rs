use anyhow::Result;
use clap::{Parser, Subcommand};

use presencewatch::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "presencewatch",
    about = "Behavioral pattern mining and risk correlation for detection streams",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (falls back to PRESENCEWATCH_CONFIG, then
    /// the system location, then defaults)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + background sweep)
    Serve {
        /// Bind address override
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run a one-shot pattern analysis against the store
    Analyze {
        /// Subject to analyze; omit for a site-wide pass
        #[arg(long)]
        subject: Option<String>,

        /// Analysis window in hours
        #[arg(long, default_value = "24")]
        window_hours: u32,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Purge detections older than the retention horizon
    Retention {
        /// Override the configured retention period in days
        #[arg(long)]
        days: Option<u32>,
    },
}

fn load_config(path: Option<&str>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(std::path::Path::new(path)),
        None => Ok(AppConfig::load_or_default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting PresenceWatch daemon");
            presencewatch::serve(config).await?;
        }
        Commands::Analyze {
            subject,
            window_hours,
            json,
        } => {
            let engine = presencewatch::build_engine(&config)?;
            let result = engine.analyze(subject.as_deref(), window_hours).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\nPresenceWatch Analysis");
                println!(
                    "Subject:    {}",
                    result.subject_id.as_deref().unwrap_or("(site-wide)")
                );
                println!("Window:     {}h", result.window_hours);
                for line in result.summary() {
                    println!(" - {}", line);
                }
                if !result.anomalies.is_empty() {
                    println!("\n{:<28} | {:<8} | Details", "Anomaly", "Severity");
                    println!("{:-<28}-|-{:-<8}-|-{:-<40}", "", "", "");
                    for anomaly in &result.anomalies {
                        println!(
                            "{:<28} | {:<8} | {}",
                            anomaly.kind.to_string(),
                            anomaly.severity.to_string(),
                            anomaly.description
                        );
                    }
                }
                if !result.recommendations.is_empty() {
                    println!("\nRecommendations:");
                    for recommendation in &result.recommendations {
                        println!(" - {}", recommendation);
                    }
                }
                println!();
            }
        }
        Commands::Retention { days } => {
            let days = days.unwrap_or(config.retention.days);
            let engine = presencewatch::build_engine(&config)?;
            let removed = engine.purge_older_than(days).await?;
            println!("Removed {removed} detections older than {days} days.");
        }
    }

    Ok(())
}
