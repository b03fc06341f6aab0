//! Command-line surface and dispatch.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use crate::audit::{AuditLedger, AuditTotals};
use crate::config::Config;
use crate::gateway;
use crate::orchestrator::Orchestrator;
use crate::sources::SourceStore;
use crate::store::Store;

/// `Lookout` - scheduled AI deep-research jobs with cost accounting.
#[derive(Parser, Debug)]
#[command(name = "lookout")]
#[command(version)]
#[command(
    about = "Scheduled AI deep research with an audit ledger and source trust scores.",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the scheduler, job queue, and HTTP gateway
    Serve {
        /// Host to bind to (overrides config.toml)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config.toml)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one research config (or all enabled configs) and exit
    Run {
        /// Config id to run
        #[arg(required_unless_present = "all")]
        config_id: Option<String>,

        /// Run every enabled config instead of one
        #[arg(long, conflicts_with = "config_id")]
        all: bool,
    },

    /// Manage research configs
    Configs {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show recent audit entries and cost totals
    Audit {
        /// Number of entries to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Show sources ranked by trust score
    Sources {
        /// Restrict to one category (papers, news, markets, politics)
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// List all research configs
    List,
}

pub async fn dispatch(cli: Cli, settings: Config) -> Result<()> {
    match cli.command {
        Commands::Serve { host, port } => serve(settings, host, port).await,
        Commands::Run { config_id, all } => run(settings, config_id, all).await,
        Commands::Configs {
            command: ConfigCommands::List,
        } => list_configs(settings).await,
        Commands::Audit { limit } => show_audit(settings, limit).await,
        Commands::Sources { category } => show_sources(settings, category).await,
    }
}

async fn serve(mut settings: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let orchestrator = Arc::new(Orchestrator::start(settings).await?);
    println!(
        "lookout serving on http://{}:{} (Ctrl-C to stop)",
        orchestrator.settings().server.host,
        orchestrator.settings().server.port
    );

    tokio::select! {
        result = gateway::run_gateway(Arc::clone(&orchestrator)) => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutdown requested");
            orchestrator.shutdown();
            Ok(())
        }
    }
}

/// One-shot execution through the same engine the scheduler uses. Runs
/// sequentially so the provider never sees concurrent deep-research calls.
async fn run(settings: Config, config_id: Option<String>, all: bool) -> Result<()> {
    let orchestrator = Orchestrator::start(settings).await?;
    let engine = orchestrator.engine();

    if all {
        let configs = orchestrator.store().configs().list_enabled().await?;
        if configs.is_empty() {
            bail!("no enabled configs");
        }
        for config in configs {
            println!("running {} ({})...", config.name, config.id);
            let report = engine.execute(&config.id).await?;
            println!("  {} items", report.items.len());
        }
    } else {
        let Some(config_id) = config_id else {
            bail!("provide a config id or --all");
        };
        let report = engine.execute(&config_id).await?;
        println!("{}: {} items", report.config_name, report.items.len());
    }

    orchestrator.shutdown();
    Ok(())
}

async fn list_configs(settings: Config) -> Result<()> {
    let store = Store::open(&settings.db_path()).await?;
    let configs = store.configs().list().await?;
    if configs.is_empty() {
        println!("no research configs (run `lookout serve` once to seed defaults)");
        return Ok(());
    }

    println!(
        "{:<38} {:<28} {:<10} {:<14} {}",
        "ID", "NAME", "CATEGORY", "SCHEDULE", "ENABLED"
    );
    for config in configs {
        println!(
            "{:<38} {:<28} {:<10} {:<14} {}",
            config.id,
            config.name,
            config.category,
            config.schedule,
            if config.enabled { "yes" } else { "no" }
        );
    }
    Ok(())
}

async fn show_audit(settings: Config, limit: i64) -> Result<()> {
    let store = Store::open(&settings.db_path()).await?;
    let ledger = AuditLedger::new(&store);
    let entries = ledger.list_recent(limit).await?;
    if entries.is_empty() {
        println!("no audit entries");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {:<9}  {:<26}  {:>9}  {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.status,
            entry.config_name.as_deref().unwrap_or("-"),
            format!("{:.2}c", entry.estimated_cost_cents),
            entry.error_message.as_deref().unwrap_or("")
        );
    }

    let totals = AuditTotals::for_entries(&entries);
    println!();
    println!(
        "totals: {:.2}c, {} input / {} output tokens, {} web searches",
        totals.total_cost_cents,
        totals.total_input_tokens,
        totals.total_output_tokens,
        totals.total_web_searches
    );
    Ok(())
}

async fn show_sources(settings: Config, category: Option<String>) -> Result<()> {
    let store = Store::open(&settings.db_path()).await?;
    let sources = SourceStore::new(&store)
        .top_sources(category.as_deref())
        .await?;
    if sources.is_empty() {
        println!("no sources with feedback yet");
        return Ok(());
    }

    println!("{:<36} {:>7} {:>6} {:>6}", "DOMAIN", "TRUST", "UP", "DOWN");
    for source in sources {
        println!(
            "{:<36} {:>7.3} {:>6} {:>6}",
            source.domain, source.trust_score, source.upvotes, source.downvotes
        );
    }
    Ok(())
}
