//! docqa application binary - composition root.
//!
//! Start-up runs strictly in order and any failure before the server starts
//! is fatal:
//! 1. Parse CLI flags and initialise tracing
//! 2. Load and validate configuration
//! 3. Resolve the LLM credential
//! 4. Load the Markdown corpus
//! 5. Build the document index, or restore a matching snapshot
//! 6. Wire the rewriter, retriever and answerer into the orchestrator
//! 7. Serve the HTTP API and chat page

mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};

use docqa_api::state::AppState;
use docqa_chat::{
    ConversationOrchestrator, ExpiryPolicy, LlmAnswerer, LlmQueryRewriter, OrchestratorConfig,
    SessionStore,
};
use docqa_core::config::DocqaConfig;
use docqa_core::error::DocqaError;
use docqa_index::{embedding, load_documents, DocumentIndex, TextSplitter};
use docqa_llm::{ChatModel, OpenAiCompatClient};

use crate::cli::{expand_home, resolve_under, CliArgs};

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

/// Periodically drop sessions idle past the configured timeout.
fn spawn_session_eviction(store: Arc<SessionStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.evict_expired() {
                Ok(0) => {}
                Ok(n) => debug!(evicted = n, remaining = store.len(), "Evicted idle sessions"),
                Err(e) => warn!(error = %e, "Session eviction failed"),
            }
        }
    });
}

async fn run(args: CliArgs) -> Result<(), DocqaError> {
    // Config is read before tracing starts so its log level can apply.
    let config_file = args.resolve_config_path();
    let loaded = if config_file.exists() {
        Some(DocqaConfig::load(&config_file))
    } else {
        None
    };
    let configured_level = match &loaded {
        Some(Ok(c)) => c.general.log_level.clone(),
        _ => "info".to_string(),
    };
    init_tracing(&args.resolve_log_level(&configured_level));

    info!("Starting docqa v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Some(Ok(c)) => {
            info!(path = %config_file.display(), "Configuration loaded");
            c
        }
        Some(Err(e)) => return Err(e),
        None => {
            info!(path = %config_file.display(), "No configuration file; using defaults");
            DocqaConfig::default()
        }
    };
    if let Some(dir) = args.resolve_docs_dir() {
        config.documents.dir = dir;
    }
    config.api.port = args.resolve_port(config.api.port);
    config.validate()?;

    // Credential first: nothing is loaded or embedded without one.
    let model: Arc<dyn ChatModel> = Arc::new(OpenAiCompatClient::from_config(&config.llm)?);
    info!(model = %config.llm.model, base_url = %config.llm.base_url, "LLM client ready");

    let docs_dir = expand_home(&config.documents.dir);
    let documents = load_documents(&docs_dir, &config.documents.extension)?;

    let splitter = TextSplitter::from_config(&config.chunking)?;
    let embedder = embedding::from_config(&config.retrieval)
        .map_err(|e| DocqaError::IndexBuild(e.to_string()))?;
    let data_dir = expand_home(&config.general.data_dir);
    let persist_dir = resolve_under(&data_dir, &config.retrieval.persist_dir);
    let reuse = config.retrieval.reuse_persisted && !args.rebuild_index;
    let (index, origin) =
        DocumentIndex::load_or_build(&documents, &splitter, embedder, &persist_dir, reuse).await?;
    info!(
        origin = %origin,
        chunks = index.len(),
        sources = index.source_count(),
        model = %index.model_name(),
        "Document index ready"
    );
    let index = Arc::new(index);

    let policy = ExpiryPolicy::from_config(&config.session);
    let store = Arc::new(SessionStore::new(policy));
    if policy.idle_timeout.is_some() {
        let every = Duration::from_secs(config.session.eviction_interval_secs.max(1));
        spawn_session_eviction(Arc::clone(&store), every);
    }

    let orchestrator = ConversationOrchestrator::new(
        store,
        Arc::new(LlmQueryRewriter::new(Arc::clone(&model))),
        index.clone(),
        Arc::new(LlmAnswerer::new(model).with_max_sentences(config.session.max_answer_sentences)),
        OrchestratorConfig::from_config(&config),
    );

    let state = AppState::new(config, Arc::new(orchestrator), index);
    docqa_api::start_server(state).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "docqa failed to start");
            ExitCode::FAILURE
        }
    }
}
