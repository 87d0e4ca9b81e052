//! Elector CLI
//!
//! Runs leader electors for this instance's singleton duties against the
//! shared PostgreSQL lock database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use elect_core::leadership::{AdvisoryLockStore, LockPurpose, PgAdvisoryLockStore};
use elect_observability::LoggingConfig;
use std::path::PathBuf;
use std::sync::Arc;

mod commands;
mod config;
mod validator;

use commands::{run_electors, try_once};
use config::AppConfig;
use validator::ConfigValidator;

#[derive(Parser)]
#[command(name = "elector")]
#[command(version)]
#[command(about = "Leader election for singleton duties over PostgreSQL advisory locks", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compete for every configured purpose until Ctrl+C
    Run,

    /// Try to acquire one purpose's lock once, then release it
    Once {
        /// Purpose name (e.g. jobs-scheduler)
        purpose: LockPurpose,
    },

    /// List the lock catalog
    Purposes,

    /// Show current configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },

    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let explicit_config = cli.config.is_some();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) if explicit_config => return Err(e),
        Err(_) => {
            if cli.verbose {
                eprintln!("Using default configuration (no config file found)");
            }
            AppConfig::default()
        }
    }
    .with_env_overrides();

    // Initialize logging
    let mut logging = LoggingConfig::default()
        .with_level_name(&config.logging.level)
        .with_json_format(config.logging.json_format || cli.format == OutputFormat::Json);
    if cli.verbose {
        logging = logging.with_level(tracing::Level::DEBUG);
    }
    if let Err(e) = elect_observability::init_logging_with_config(logging) {
        eprintln!("{}: {}", "Failed to initialize logging".yellow(), e);
    }

    match cli.command {
        Commands::Run => cmd_run(config).await,
        Commands::Once { purpose } => cmd_once(config, purpose, cli.format).await,
        Commands::Purposes => cmd_purposes(cli.format),
        Commands::Config { show_secrets } => cmd_config(config, show_secrets, cli.format),
        Commands::Validate => cmd_validate(config, &config_path),
    }
}

fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("com", "elect", "elector") {
        dirs.config_dir().join("config.yaml")
    } else {
        PathBuf::from("config/elector.yaml")
    }
}

async fn cmd_run(config: AppConfig) -> Result<()> {
    println!("{}", "Validating configuration...".cyan());

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    if validation_result.has_errors() {
        println!();
        println!(
            "{}",
            "Startup aborted due to configuration errors. Fix the errors above and try again."
                .red()
                .bold()
        );
        std::process::exit(1);
    }

    println!();
    run_electors(&config).await
}

async fn cmd_once(config: AppConfig, purpose: LockPurpose, format: OutputFormat) -> Result<()> {
    config
        .election
        .validate()
        .context("Invalid election configuration")?;

    let store = PgAdvisoryLockStore::connect(&config.database.url, config.database.pool_options())
        .await
        .context("Failed to connect to the lock database")?;
    let store: Arc<dyn AdvisoryLockStore> = Arc::new(store);

    let outcome = try_once(store, purpose, &config.election).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if outcome.granted {
        println!(
            "{} {} (key {}): {}",
            "✓".green(),
            purpose.name(),
            outcome.lock_key,
            "acquired and released".green()
        );
    } else {
        println!(
            "{} {} (key {}): {}",
            "✗".yellow(),
            purpose.name(),
            outcome.lock_key,
            "held by another instance".yellow()
        );
    }

    Ok(())
}

fn cmd_purposes(format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        let catalog: Vec<_> = LockPurpose::ALL
            .iter()
            .map(|purpose| {
                serde_json::json!({
                    "name": purpose.name(),
                    "key": purpose.lock_id().key(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&catalog)?);
    } else {
        println!("{}", "Lock Purposes".bold());
        println!("─────────────────────────────────");
        for purpose in LockPurpose::ALL {
            println!("  {:<22} {}", purpose.name().cyan(), purpose.lock_id().key());
        }
    }

    Ok(())
}

fn cmd_config(config: AppConfig, show_secrets: bool, format: OutputFormat) -> Result<()> {
    let display_config = if show_secrets {
        config
    } else {
        config.redact_secrets()
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&display_config)?);
    } else {
        println!("{}", "Current Configuration".bold());
        println!("─────────────────────────");
        println!("Database: {}", display_config.database.url);
        println!("Max Connections: {}", display_config.database.max_connections);
        println!("Instance: {}", display_config.election.instance_id);
        println!("Poll Interval: {:?}", display_config.election.poll_interval);
        println!(
            "Operation Timeout: {:?}",
            display_config.election.operation_timeout
        );
        println!("\nPurposes:");
        for purpose in &display_config.purposes {
            println!("  - {} ({})", purpose.name(), purpose.lock_id().key());
        }
    }

    Ok(())
}

fn cmd_validate(config: AppConfig, config_path: &std::path::Path) -> Result<()> {
    println!(
        "Validating configuration: {}",
        config_path.display().to_string().cyan()
    );

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!("  Purposes: {}", config.purposes.len());
    println!("  Instance: {}", config.election.instance_id);
    println!("  Database: {}", config.redact_secrets().database.url);

    if validation_result.has_errors() {
        println!();
        println!(
            "{}",
            "Configuration validation failed. Fix the errors above."
                .red()
                .bold()
        );
        std::process::exit(1);
    } else if validation_result.has_warnings() {
        println!();
        println!(
            "{}",
            "Configuration is valid with warnings. Review the warnings above."
                .yellow()
                .bold()
        );
    } else {
        println!();
        println!("{}", "Configuration is valid.".green().bold());
    }

    Ok(())
}
