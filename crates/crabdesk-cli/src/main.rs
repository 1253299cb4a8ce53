use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crabdesk_core::{
    load_config, ContextManager, DeskConfig, Orchestrator, PolicyEvaluator, PriorityRanker,
    SignalNormalizer,
};
use crabdesk_provider::EngineClient;
use crabdesk_social::{MastodonClient, SocialWatch};
use crabdesk_store::DeskStore;
use crabdesk_ticket::TicketManager;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "crabdesk", version, about = "customer support escalation engine")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.crabdesk",
        help = "Config root directory (contains crabdesk.yaml)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate the configuration and exit")]
    Validate,
    #[command(about = "Start the support core and the social watch")]
    Start,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    if cli.config_root.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            cli.config_root = PathBuf::from(home).join(
                cli.config_root
                    .strip_prefix("~")
                    .unwrap_or(&cli.config_root),
            );
        }
    }

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "crabdesk.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let config = load_config(&cli.config_root)?;
            println!(
                "Config valid. {} escalation keywords, {} legal keywords, {} hashtags watched.",
                config.escalation.keywords.len(),
                config.escalation.legal_keywords.len(),
                config.social.hashtags.len()
            );
            Ok(())
        }
        Commands::Start => {
            let config = load_config(&cli.config_root)?;
            run(config).await
        }
    }
}

async fn run(config: DeskConfig) -> Result<()> {
    let store = Arc::new(DeskStore::open(Path::new(&config.storage.db_path))?);

    let engine = Arc::new(EngineClient::new(
        &config.engine.base_url,
        Duration::from_secs(config.engine.timeout_secs),
    )?);

    let tickets = Arc::new(TicketManager::new(store.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        engine.clone(),
        engine.clone(),
        engine,
        SignalNormalizer::new(&config.escalation)?,
        PolicyEvaluator::new(&config.escalation),
        PriorityRanker::new(config.escalation.thresholds),
        tickets,
        ContextManager::new(store.clone(), config.escalation.context_ttl_secs),
    ));

    tracing::info!(
        app = config.app.name,
        env = config.app.env,
        "crabdesk core started"
    );

    let cancel = CancellationToken::new();
    let watch_handle = if config.social.enabled {
        let client = Arc::new(MastodonClient::new(
            &config.social.instance_url,
            &config.social.access_token,
        ));
        let watch = SocialWatch::new(client, orchestrator, store, &config.social);
        Some(tokio::spawn(watch.run(cancel.clone())))
    } else {
        tracing::info!("social watch disabled");
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    cancel.cancel();
    if let Some(handle) = watch_handle {
        handle.await?;
    }
    Ok(())
}
