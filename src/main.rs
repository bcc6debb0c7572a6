use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info};
use std::io;
use std::path::PathBuf;

use doc_rag::chat::ChatShell;
use doc_rag::chunking::ChunkingStrategy;
use doc_rag::config::{ProviderKind, Settings};
use doc_rag::database::QdrantIndex;
use doc_rag::embeddings::EmbeddingProvider;
use doc_rag::provider::ModelProvider;
use doc_rag::rag::RagEngine;
use doc_rag::session::SessionStore;
use doc_rag::uploads::{self, UploadStore};

type Engine = RagEngine<ModelProvider, QdrantIndex, ModelProvider>;

/// Question answering over your documents with Gemini or OpenAI and Qdrant
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Model provider (overrides RAG_PROVIDER)
    #[arg(long, value_enum, global = true)]
    provider: Option<ProviderKind>,

    /// Qdrant collection name (overrides RAG_COLLECTION)
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Number of chunks retrieved per question (overrides RAG_TOP_K)
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Merge paragraphs into chunks of about this many tokens (overrides RAG_CHUNK_TOKENS)
    #[arg(long, global = true)]
    chunk_tokens: Option<usize>,

    /// Where uploaded copies are stored (overrides UPLOAD_DIR)
    #[arg(long, global = true)]
    upload_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload and index documents (pdf, docx, txt)
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Answer a single question
    Ask { question: String },
    /// Start an interactive chat
    Chat {
        /// Resume or name the session
        #[arg(long)]
        session: Option<String>,

        /// Files to upload before the chat starts
        #[arg(long)]
        upload: Vec<PathBuf>,
    },
    /// Delete the collection and everything indexed in it
    Reset,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings =
            Settings::from_env(self.provider).context("Failed to load configuration")?;

        if let Some(collection) = &self.collection {
            settings.qdrant.collection = collection.clone();
        }
        if let Some(top_k) = self.top_k {
            if top_k == 0 {
                bail!("--top-k must be at least 1");
            }
            settings.rag.top_k = top_k;
        }
        if let Some(target_tokens) = self.chunk_tokens {
            settings.rag.chunking = match settings.rag.chunking {
                _ if target_tokens == 0 => ChunkingStrategy::Paragraph,
                ChunkingStrategy::Bounded { overlap_tokens, .. } => ChunkingStrategy::Bounded {
                    target_tokens,
                    overlap_tokens,
                },
                ChunkingStrategy::Paragraph => ChunkingStrategy::Bounded {
                    target_tokens,
                    overlap_tokens: 0,
                },
            };
        }
        if let Some(dir) = &self.upload_dir {
            settings.uploads.dir = dir.clone();
        }

        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = cli.settings()?;

    let provider = ModelProvider::new(settings.provider.clone());
    info!(
        "Using {} with collection '{}'",
        provider.name(),
        settings.qdrant.collection
    );

    let index = QdrantIndex::new(settings.qdrant.clone(), provider.dimension())
        .context("Failed to initialize Qdrant client")?;

    if let Command::Reset = cli.command {
        if index.collection_exists().await? {
            index.delete_collection().await?;
            println!("Deleted collection '{}'", index.collection());
        } else {
            println!("Collection '{}' does not exist", index.collection());
        }
        return Ok(());
    }

    index
        .ensure_collection()
        .await
        .context("Failed to prepare collection")?;

    // Initialize RAG engine
    let engine = RagEngine::new(provider.clone(), index, provider, settings.rag.clone());

    match cli.command {
        Command::Ingest { files } => {
            let mut store =
                UploadStore::new(settings.uploads.clone()).context("Failed to open upload dir")?;
            ingest_files(&engine, &mut store, &files).await?;
        }
        Command::Ask { question } => {
            let answer = engine
                .answer(&question)
                .await
                .context("Failed to answer question")?;
            println!("{}", answer);
        }
        Command::Chat { session, upload } => {
            let mut store =
                UploadStore::new(settings.uploads.clone()).context("Failed to open upload dir")?;
            if !upload.is_empty() {
                ingest_files(&engine, &mut store, &upload).await?;
            }

            let mut sessions = SessionStore::new();
            let mut shell = ChatShell::new(&engine, &mut store, &mut sessions, session.as_deref());
            shell
                .run(io::stdin().lock(), &mut io::stdout())
                .await
                .context("Error in chat loop")?;
        }
        Command::Reset => {}
    }

    Ok(())
}

/// Upload every file, reporting each; fails if any file failed
async fn ingest_files(engine: &Engine, store: &mut UploadStore, files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;

    for path in files {
        match uploads::upload_document(store, engine, path).await {
            Ok(record) => println!("{}: {} chunks processed", record.original_name, record.chunks),
            Err(e) => {
                error!("Failed to ingest {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} files failed to ingest", failed, files.len());
    }
    Ok(())
}
