//! Sigmaview: Sigma rule browser core
//!
//! Command-line front end for the library: search the rule database,
//! convert a rule's detection logic to a Stellar query, parse a query into
//! its display tree, or print grouping statistics.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sigmaview::config::AppConfig;
use sigmaview::models::Detection;
use sigmaview::{compiler, grouping, loader, queryparse, search};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "sigmaview")]
#[command(about = "Sigma rule browser core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override logging level (e.g., error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override the rules directory
    #[arg(long, global = true, value_name = "DIR")]
    rules_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search loaded rules with a boolean filter expression
    Search {
        /// Filter expression, e.g. 'author:Nextron AND level:high'
        query: String,
    },
    /// Convert one rule file to a Stellar query string
    Convert {
        /// Path to a Sigma rule YAML file
        file: PathBuf,
    },
    /// Parse a Stellar query string into its display tree (JSON)
    Parse {
        /// Query string, e.g. 'event_data.Image contains "cmd.exe"'
        query: String,
    },
    /// Load the rules directory and print grouping statistics
    Stats {
        /// Optional category filter for grouping
        #[arg(long)]
        category: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = match AppConfig::new() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            eprintln!("Hint: check config.toml and SIGMAVIEW__* environment overrides.");
            return Err(anyhow::anyhow!("Failed to load configuration: {}", err));
        }
    };
    if let Some(dir) = cli.rules_dir {
        cfg.rules.path = dir;
    }
    if let Some(level) = cli.log_level {
        if !level.trim().is_empty() {
            cfg.logging.level = level;
        }
    }

    // Keep the guard alive so buffered file output gets flushed on exit.
    let _guard = init_logging(&cfg);

    match cli.command {
        Commands::Search { query } => cmd_search(&cfg, &query),
        Commands::Convert { file } => cmd_convert(&file),
        Commands::Parse { query } => cmd_parse(&query),
        Commands::Stats { category } => cmd_stats(&cfg, category.as_deref()),
    }
}

/// Install the tracing subscriber: rolling file log plus optional console
/// output, both filtered by the configured level.
fn init_logging(cfg: &AppConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let file = rolling::daily(&cfg.logging.directory, &cfg.logging.filename);
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new(&cfg.logging.level));

    if cfg.logging.console_output {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::new(&cfg.logging.level));
        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(file_layer).init();
    }

    guard
}

fn cmd_search(cfg: &AppConfig, query: &str) -> Result<()> {
    let records = loader::load_rules(&cfg.rules.path)?;
    let results = search::search(&records, query);

    info!(
        total = records.len(),
        matched = results.len(),
        "Search completed"
    );

    println!("{} of {} rules match", results.len(), records.len());
    for record in &results {
        let title = if record.title.is_empty() {
            "(untitled)"
        } else {
            record.title.as_str()
        };
        println!("  {:60} {}", title, record.file_path);
    }

    Ok(())
}

fn cmd_convert(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file).context("Failed to read rule file")?;

    let doc: serde_yaml::Value =
        serde_yaml::from_str(&content).context("Invalid YAML format")?;
    let Some(detection_value) = doc.get("detection") else {
        println!("Error: No detection section found in rule");
        return Ok(());
    };
    let detection: Detection = serde_yaml::from_value(detection_value.clone())
        .context("Invalid detection section")?;

    println!("{}", compiler::compile(&detection));
    Ok(())
}

fn cmd_parse(query: &str) -> Result<()> {
    let tree = queryparse::parse(query);
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

fn cmd_stats(cfg: &AppConfig, category: Option<&str>) -> Result<()> {
    let records = loader::load_rules(&cfg.rules.path)?;
    let grouped = grouping::group_rules(&records, category);

    println!("Loaded {} rules from {:?}", records.len(), cfg.rules.path);
    for (group, rules) in &grouped {
        println!("  {:30} {:>5} rules", group, rules.len());
    }

    Ok(())
}
