mod cli;

use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use view_harvest::client::{Clients, HttpApiClient};
use view_harvest::config::HarvestConfig;
use view_harvest::domain::VideoRecord;
use view_harvest::events::SessionEvent;
use view_harvest::logging::init_logging;
use view_harvest::orchestrator::resolve_catalog;
use view_harvest::{ScrapeBatch, build_orchestrator};

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = HarvestConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(filter) = args.log_filter {
        config.logging.filter = Some(filter);
    }
    let _logging = init_logging(&config.logging)?;

    let client = Arc::new(HttpApiClient::new(config.http_config())?);

    match args.command {
        Commands::Run {
            input,
            project,
            date,
            mode,
            retry,
        } => {
            if let Some(mode) = mode {
                config.mode = mode;
            }
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let videos: Vec<VideoRecord> =
                serde_json::from_str(&content).context("parsing video records")?;
            let report_date = date.unwrap_or_else(|| Local::now().date_naive());

            run(
                &config,
                Clients::from_http(client),
                ScrapeBatch::new(project, report_date, videos),
                retry,
            )
            .await
        }
        Commands::Workflows => {
            let catalog = resolve_catalog(client.as_ref(), &config.workflow_rules).await?;
            if catalog.is_empty() {
                warn!("No workflow matches any rule");
            }
            println!("{}", serde_json::to_string_pretty(catalog.rules())?);
            Ok(())
        }
    }
}

async fn run(
    config: &HarvestConfig,
    clients: Clients,
    batch: ScrapeBatch,
    retry: bool,
) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config, clients);
    let reporter = tokio::spawn(report_events(orchestrator.subscribe()));

    let mut handle = orchestrator.submit(batch).await?;
    let mut session = tokio::select! {
        session = handle.wait() => session,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping after the current task");
            orchestrator.cancel(&handle).await;
            handle.wait().await
        }
    };

    if retry && session.failed_tasks > 0 && !session.cancelled {
        info!("Retrying {} failed tasks", session.failed_tasks);
        handle = orchestrator.retry_failed(&handle).await?;
        session = handle.wait().await;
    }

    orchestrator.shutdown().await;
    drop(orchestrator);
    reporter.abort();

    info!("Finished: {}", session.summary());
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

async fn report_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(event @ SessionEvent::TaskUpdated { .. }) => debug!("{}", event.description()),
            Ok(SessionEvent::PollTick { .. }) => {}
            Ok(event) => info!("{}", event.description()),
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("Skipped {} session events", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
