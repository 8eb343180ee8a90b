//! # Conduit Configuration Tool
//!
//! Loads the layered configuration the same way a running context does and
//! validates it, prints it, or lists the environment it would be loaded for.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conduit_support::config::{ConfigLoader, SupportConfig};
use conduit_support::constants::defaults;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "conduit-config")]
#[command(about = "Validate and inspect conduit support configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to load (defaults to CONDUIT_ENV, then APP_ENV, then development)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Load a single file instead of the layered directory
    #[arg(short, long, conflicts_with = "config_dir")]
    file: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Print the effective configuration as JSON
    Show,

    /// Show the detected environment and the files and variables that apply
    Env,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Show) => show(&cli),
        Some(Commands::Env) => env(&cli),
        Some(Commands::Validate) | None => validate(&cli),
    };

    if let Err(e) = result {
        error!("{e:#}");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn environment(cli: &Cli) -> String {
    cli.environment
        .clone()
        .unwrap_or_else(ConfigLoader::detect_environment)
}

fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(defaults::CONFIG_DIR))
}

fn load(cli: &Cli) -> Result<SupportConfig> {
    if let Some(file) = &cli.file {
        return ConfigLoader::load_file(file)
            .with_context(|| format!("failed to load {}", file.display()));
    }
    let environment = environment(cli);
    let loader = ConfigLoader::load_from_directory_with_env(Some(config_dir(cli)), &environment)
        .with_context(|| format!("failed to load configuration for environment '{environment}'"))?;
    Ok(loader.config().clone())
}

fn validate(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    println!("Configuration is valid");
    println!("  exchange pooling:   {}", config.exchange.pooled);
    println!("  uuid generator:     {}", config.uuid.generator);
    println!("  reload enabled:     {}", config.reload.enabled);
    match config.async_processing.await_timeout_ms {
        Some(ms) => println!("  await timeout:      {ms}ms"),
        None => println!("  await timeout:      none"),
    }
    Ok(())
}

fn show(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    let json = serde_json::to_string_pretty(&config).context("failed to serialize configuration")?;
    println!("{json}");
    Ok(())
}

fn env(cli: &Cli) -> Result<()> {
    let environment = environment(cli);
    let dir = config_dir(cli);
    println!("Environment: {environment}");
    println!("Config directory: {}", dir.display());

    let base = dir.join(format!("{}.toml", defaults::CONFIG_BASENAME));
    let env_file = dir.join(format!("{}.{environment}.toml", defaults::CONFIG_BASENAME));
    print_file_status(&base);
    print_file_status(&env_file);

    let prefix = format!("{}__", defaults::ENV_PREFIX);
    let mut overrides: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| key.starts_with(&prefix))
        .collect();
    overrides.sort();
    if overrides.is_empty() {
        println!("No {prefix}* overrides set");
    } else {
        println!("Overrides:");
        for (key, value) in overrides {
            println!("  {key}={value}");
        }
    }
    Ok(())
}

fn print_file_status(path: &Path) {
    let status = if path.is_file() { "found" } else { "missing (optional)" };
    println!("  {}: {status}", path.display());
}
