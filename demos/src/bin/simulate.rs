use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use consult_flow::{
    AutoRunner, DialogueOrchestrator, Document, Message, ModelConfig, OpenAiCompatibleBackend,
    OpenAiCompatibleEmbedder, RagManager, RetrievalConfig, SimulationSetup, SimulationStatus,
    Speaker, VectorRetriever,
    prompts::{DEFAULT_DOCTOR_INSTRUCTION, with_termination_directive},
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    Doctor,
    Patient,
}

impl From<Side> for Speaker {
    fn from(side: Side) -> Self {
        match side {
            Side::Doctor => Speaker::Doctor,
            Side::Patient => Speaker::Patient,
        }
    }
}

/// Runs a doctor/patient consultation against an OpenAI-compatible endpoint.
///
/// Connection settings come from CONSULT_BASE_URL, CONSULT_API_KEY, CONSULT_MODEL and
/// CONSULT_TEMPERATURE.
#[derive(Debug, Parser)]
#[command(name = "simulate")]
struct Args {
    /// Patient profile the patient side role-plays
    #[arg(long)]
    profile: String,

    /// Doctor system instruction
    #[arg(long)]
    instruction: Option<String>,

    /// Medical records file the doctor can search during the consultation
    #[arg(long)]
    records: Option<PathBuf>,

    #[arg(long, default_value_t = 5)]
    max_turns: u32,

    /// Who speaks first
    #[arg(long, value_enum, default_value_t = Side::Patient)]
    starter: Side,

    /// Iteration ceiling for the automatic run
    #[arg(long, default_value_t = 20)]
    safety_limit: usize,

    /// Play one side yourself from the terminal instead of running automatically
    #[arg(long, value_enum)]
    play: Option<Side>,
}

fn print_message(message: &Message) {
    if message.is_error() {
        println!("[{} failed] {}\n", message.role, message.content);
        return;
    }
    for call in &message.tool_calls {
        let query = call
            .arguments
            .get("query")
            .map(|q| q.to_string())
            .unwrap_or_default();
        println!("  ({} {})", call.tool_name, query);
    }
    println!("{}: {}\n", message.role, message.content);
}

fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut line = String::new();
    let read = io::stdin()
        .read_line(&mut line)
        .context("Failed to read input")?;
    let line = line.trim().to_string();
    Ok((read > 0 && !line.is_empty()).then_some(line))
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
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

    let instruction = args
        .instruction
        .unwrap_or_else(|| DEFAULT_DOCTOR_INSTRUCTION.to_string());
    let mut setup = SimulationSetup::new(
        args.profile,
        with_termination_directive(&instruction, args.max_turns),
        args.max_turns,
    );
    if let Some(path) = &args.records {
        let records = Document::from_path(path)
            .await
            .with_context(|| format!("Failed to read records from {}", path.display()))?;
        setup = setup.with_grounding(records.text);
    }

    let mut dialogue = DialogueOrchestrator::new(model, backend, rag)?;
    dialogue.initialize(setup).await?;

    println!("Starting consultation ({} turns)", args.max_turns);
    if args.records.is_some() {
        println!(
            "Records tool: {}",
            if dialogue.has_records_tool() { "available" } else { "unavailable" }
        );
    }
    println!();

    let Some(human) = args.play else {
        let opening = dialogue.generate_opening(args.starter.into()).await?;
        print_message(&opening);

        let outcome = AutoRunner::new(args.safety_limit).run(&mut dialogue).await;
        for message in &outcome.messages {
            print_message(message);
        }
        println!("Stopped: {:?} after turn {}", outcome.stop_reason, dialogue.current_turn());
        return Ok(());
    };

    let human: Speaker = human.into();
    if Speaker::from(args.starter) != human {
        let opening = dialogue.generate_opening(args.starter.into()).await?;
        print_message(&opening);
    }

    println!("You are the {}. Empty line to stop.\n", human.role());
    while dialogue.status() == SimulationStatus::Running {
        let Some(text) = read_line(&format!("{}> ", human.role()))? else {
            break;
        };
        if let Some(reply) = dialogue.send_as(human, &text).await {
            print_message(&reply);
        }
    }

    if dialogue.status() == SimulationStatus::Completed {
        println!("The doctor has reached a diagnosis.");
    }
    Ok(())
}
