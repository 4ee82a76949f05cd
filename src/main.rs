//! docket server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use docket::agent::WorkflowEngine;
use docket::jobs::{JobStore, JobStoreConfig, JobWorker, WorkerConfig};
use docket::llm::{LlmClient, OpenAiCompatibleClient};
use docket::server;
use docket::settings::{get_with_env_fallback, DocketSettings, SettingsManager};
use docket::tools::{
    ClaimAnalysisTool, ClaimDraftingTool, PriorArtSearchTool, ToolRegistry, WebSearchTool,
};

#[derive(Debug, Parser)]
#[command(name = "docket", about = "Job-queue backend for an AI patent drafting assistant")]
struct Args {
    /// Path to a settings file (default: ~/.docket/settings.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,

    /// Write a settings template and exit
    #[arg(long)]
    init_settings: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let settings_manager = match &args.config {
        Some(path) => SettingsManager::with_path(path.clone()).await?,
        None => SettingsManager::new().await?,
    };

    if args.init_settings {
        let created = settings_manager.ensure_settings_file().await?;
        if created {
            println!("wrote settings template to {:?}", settings_manager.path());
        } else {
            println!("settings file already exists at {:?}", settings_manager.path());
        }
        return Ok(());
    }

    let settings = settings_manager.get().await;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(settings.advanced.log_level.clone())
            }),
        )
        .init();

    let llm = build_llm_client(&settings);
    if llm.is_none() {
        tracing::warn!(
            "no LLM endpoint configured; intent detection and planning will use heuristics, \
             drafting and analysis tools will be unavailable"
        );
    }

    let registry = Arc::new(build_tool_registry(&settings, llm.clone()));
    tracing::info!(tools = registry.len(), "tool registry initialized");

    let (store, queue_rx) = JobStore::new(JobStoreConfig::from_settings(&settings.jobs));
    let store = Arc::new(store);

    let engine = Arc::new(WorkflowEngine::new(llm, registry));
    let shutdown = tokio_util::sync::CancellationToken::new();
    let worker_handle = JobWorker::new(
        store.clone(),
        engine,
        queue_rx,
        WorkerConfig::from_settings(&settings.jobs),
        shutdown.clone(),
    )
    .spawn();

    let port = args.port.unwrap_or(settings.server.port);
    let (addr, server_shutdown) =
        server::start_server(&settings.server.host, port, store).await?;
    tracing::info!("docket ready on {addr}");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    server_shutdown.cancel();
    shutdown.cancel();
    worker_handle.await.ok();

    Ok(())
}

fn build_llm_client(settings: &DocketSettings) -> Option<Arc<dyn LlmClient>> {
    let api_key = get_with_env_fallback(
        &settings.llm.api_key,
        &["DOCKET_LLM_API_KEY", "OPENAI_API_KEY"],
        None,
    )?;

    Some(Arc::new(OpenAiCompatibleClient::new(
        settings.llm.base_url.clone(),
        api_key,
        settings.llm.model.clone(),
    )))
}

fn build_tool_registry(
    settings: &DocketSettings,
    llm: Option<Arc<dyn LlmClient>>,
) -> ToolRegistry {
    let tavily_key =
        get_with_env_fallback(&settings.api_keys.tavily, &["TAVILY_API_KEY"], None);
    let patents_view_key = get_with_env_fallback(
        &settings.api_keys.patents_view,
        &["PATENTSVIEW_API_KEY"],
        None,
    );

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WebSearchTool::new(tavily_key)));
    registry.register(Arc::new(PriorArtSearchTool::new(
        llm.clone(),
        patents_view_key,
    )));
    registry.register(Arc::new(ClaimDraftingTool::new(llm.clone())));
    registry.register(Arc::new(ClaimAnalysisTool::new(llm)));
    registry
}
