mod error;
mod server;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use pdf_chat_core::{
    Credentials, DocumentChat, Embedder, EngineOptions, HashingEmbedder, IngestionOptions,
    IngestionPipeline, OpenAiChatCompletion, OpenAiEmbedder, ProviderConfig, DEFAULT_API_BASE,
    DEFAULT_CHAT_MODEL, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_CREDENTIAL_VAR,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_HISTORY_TURNS, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};
use server::{router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Remote OpenAI-compatible embeddings endpoint.
    Openai,
    /// Local trigram hashing, no network needed.
    Hashing,
}

#[derive(Parser)]
#[command(name = "pdf-chat-server", version, about = "Upload a PDF and chat with it over HTTP.")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "PDF_CHAT_LISTEN", default_value = "127.0.0.1:5000")]
    listen: String,

    /// Directory uploaded PDFs are written to
    #[arg(long, env = "PDF_CHAT_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "PDF_CHAT_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Environment variable holding the provider API key, read at upload time
    #[arg(long, default_value = DEFAULT_CREDENTIAL_VAR)]
    api_key_env: String,

    /// Embedding model identifier
    #[arg(long, env = "PDF_CHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Chat completion model identifier
    #[arg(long, env = "PDF_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Sampling temperature for answers
    #[arg(long, env = "PDF_CHAT_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Target chunk size in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Chunks sent per embedding request
    #[arg(long, default_value_t = 64)]
    embedding_batch_size: usize,

    /// Chunks retrieved per question
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Conversation turns kept as context
    #[arg(
        long,
        default_value_t = DEFAULT_HISTORY_TURNS as u16,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    history_turns: u16,

    /// Timeout for each provider request
    #[arg(long, default_value_t = 120)]
    request_timeout_secs: u64,

    /// Largest accepted request body
    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Openai)]
    embedder: EmbedderKind,

    /// Retrieve with the raw follow-up question instead of a rewritten one
    #[arg(long, default_value_t = false)]
    no_condense: bool,
}

impl Cli {
    fn provider_config(&self) -> anyhow::Result<ProviderConfig> {
        let mut config =
            ProviderConfig::new(&self.api_base, Credentials::from_env(&self.api_key_env))?;
        config.embedding_model = self.embedding_model.clone();
        config.chat_model = self.chat_model.clone();
        config.temperature = self.temperature;
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        Ok(config)
    }

    fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            embedding_batch_size: self.embedding_batch_size,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    if let Err(error) = dotenv::dotenv() {
        if !error.not_found() {
            eprintln!("failed to load .env: {error}");
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let provider = cli.provider_config()?;

    if provider.credentials.resolve().is_err() {
        warn!(
            var = %cli.api_key_env,
            "provider api key not set; uploads will fail until it is"
        );
    }

    let embedder: Arc<dyn Embedder> = match cli.embedder {
        EmbedderKind::Openai => Arc::new(OpenAiEmbedder::new(provider.clone())?),
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
    };
    let completion = Arc::new(OpenAiChatCompletion::new(provider.clone())?);
    let pipeline = IngestionPipeline::with_defaults(
        Arc::clone(&embedder),
        provider.credentials.clone(),
        cli.ingestion_options(),
    )?;

    let chat = DocumentChat::new(
        pipeline,
        embedder,
        completion,
        EngineOptions {
            top_k: cli.top_k.max(1),
            condense_question: !cli.no_condense,
        },
        usize::from(cli.history_turns),
    );

    let app = router(
        AppState::new(Arc::new(chat), cli.upload_dir.clone()),
        cli.max_upload_bytes,
    );
    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    let local_addr = listener.local_addr()?;

    info!(
        version = app_version,
        listen = %local_addr,
        upload_dir = %cli.upload_dir.display(),
        chat_model = %provider.chat_model,
        embedder = ?cli.embedder,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat-server boot"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("pdf-chat-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
    }
}
