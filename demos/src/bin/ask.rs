use anyhow::{Context, Result, bail};
use clap::Parser;
use consult_flow::{
    Document, ModelConfig, OpenAiCompatibleBackend, OpenAiCompatibleEmbedder, QaRetrieval,
    QaSession, RagManager, RetrievalConfig, VectorRetriever,
    qa::{DEFAULT_QA_THRESHOLD, DEFAULT_QA_TOP_K},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Asks the expert a question, optionally grounded in an indexed corpus.
#[derive(Debug, Parser)]
#[command(name = "ask")]
struct Args {
    question: String,

    /// Corpus to answer from. Loaded from CONSULT_DATA_DIR unless --ingest is given.
    #[arg(long)]
    corpus: Option<String>,

    /// Files to index into --corpus before asking
    #[arg(long, requires = "corpus")]
    ingest: Vec<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_QA_THRESHOLD)]
    threshold: f32,

    #[arg(long, default_value_t = DEFAULT_QA_TOP_K)]
    top_k: usize,

    /// Expert system instruction
    #[arg(long)]
    instruction: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let model = ModelConfig::from_env()?;
    let retrieval = RetrievalConfig::from_env();
    let backend = Arc::new(OpenAiCompatibleBackend::new()?);
    let embedder = Arc::new(OpenAiCompatibleEmbedder::new(
        model.clone(),
        retrieval.embedding_model.clone(),
    )?);
    let rag = Arc::new(RagManager::new(Arc::new(VectorRetriever::new(
        embedder, &retrieval,
    ))));

    if let Some(corpus) = &args.corpus {
        if args.ingest.is_empty() {
            let chunks = rag
                .load_corpus(corpus)
                .await
                .with_context(|| format!("Failed to load corpus {corpus}"))?;
            info!("Loaded corpus {} ({} chunks)", corpus, chunks);
        } else {
            let mut documents = Vec::with_capacity(args.ingest.len());
            for path in &args.ingest {
                documents.push(Document::from_path(path).await?);
            }
            let report = rag.process_files(corpus, documents).await?;
            info!(
                "Indexed {} documents into {} ({} chunks)",
                report.documents, report.corpus_id, report.chunks
            );
        }
    }

    let mut qa = QaSession::new(model, backend, rag)?;
    if let Some(instruction) = args.instruction {
        qa.set_instruction(instruction);
    }

    let retrieval = QaRetrieval {
        enabled: args.corpus.is_some(),
        similarity_threshold: args.threshold,
        top_k: args.top_k,
    };
    let exchange = qa.ask(&args.question, retrieval).await;

    if retrieval.enabled {
        println!("Referenced {} fragments", exchange.snippets.len());
        for snippet in &exchange.snippets {
            println!("  [{:.2}] {}", snippet.similarity, snippet.text);
        }
        println!();
    }

    if exchange.answer.is_error() {
        bail!("Expert failed: {}", exchange.answer.content);
    }
    println!("{}", exchange.answer.content);
    Ok(())
}
