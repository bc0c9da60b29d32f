use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use consult_flow::{
    AutoRunner, ChatBackend, ConsultError, DialogueOrchestrator, DialogueStorage,
    InMemoryDialogueStorage, IngestError, OpenAiCompatibleBackend, OpenAiCompatibleEmbedder,
    QaExchange, QaRetrieval, QaSession, RagManager, SessionRunner, SharedDialogue,
    SimulationSetup, VectorRetriever,
    prompts::{DEFAULT_DOCTOR_INSTRUCTION, with_termination_directive},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    config::ServiceConfig,
    models::{
        AddMessageRequest, AskRequest, CorporaResponse, CreateSimulationRequest, IngestRequest,
        LoadCorpusResponse, OpeningRequest, RunResponse, SendRequest, SimulationResponse,
        TurnResponse,
    },
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn consult_error(e: ConsultError) -> ApiError {
    match &e {
        ConsultError::SessionNotFound(id) => not_found_error("Session not found", id),
        ConsultError::Configuration(_) | ConsultError::NotInitialized | ConsultError::NotRunning => {
            bad_request_error(&e.to_string())
        }
        ConsultError::Ingest(ingest) => ingest_error(ingest),
        ConsultError::BackendCall(_) | ConsultError::Query(_) => {
            error!("Request failed: {}", e);
            internal_error("Request failed", &e.to_string())
        }
    }
}

fn ingest_error(e: &IngestError) -> ApiError {
    match e {
        IngestError::EmptyInput(_) | IngestError::InvalidCorpusId(_) => {
            bad_request_error(&e.to_string())
        }
        IngestError::UnknownCorpus(name) => not_found_error("Corpus not found", name),
        _ => {
            error!("Indexing failed: {}", e);
            internal_error("Indexing failed", &e.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub backend: Arc<dyn ChatBackend>,
    pub rag: Arc<RagManager>,
    pub storage: Arc<dyn DialogueStorage>,
    pub runner: SessionRunner,
    pub qa: Arc<Mutex<QaSession>>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        backend: Arc<dyn ChatBackend>,
        rag: Arc<RagManager>,
    ) -> anyhow::Result<Self> {
        let storage: Arc<dyn DialogueStorage> = Arc::new(InMemoryDialogueStorage::new());
        let runner = SessionRunner::new(storage.clone(), AutoRunner::new(config.safety_limit));
        let qa = QaSession::new(config.model.clone(), backend.clone(), rag.clone())?;

        Ok(Self {
            config: Arc::new(config),
            backend,
            rag,
            storage,
            runner,
            qa: Arc::new(Mutex::new(qa)),
        })
    }
}

pub async fn create_app(config: ServiceConfig) -> anyhow::Result<Router> {
    let backend = Arc::new(OpenAiCompatibleBackend::new()?);
    let embedder = Arc::new(OpenAiCompatibleEmbedder::new(
        config.model.clone(),
        config.retrieval.embedding_model.clone(),
    )?);
    let retriever = VectorRetriever::new(embedder, &config.retrieval);
    let rag = Arc::new(RagManager::new(Arc::new(retriever)));

    let state = AppState::new(config, backend, rag)?;
    Ok(build_router(state))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/simulations", post(create_simulation))
        .route(
            "/simulations/{session_id}",
            get(get_simulation).delete(delete_simulation),
        )
        .route("/simulations/{session_id}/reset", post(reset_simulation))
        .route("/simulations/{session_id}/opening", post(generate_opening))
        .route("/simulations/{session_id}/step", post(step_simulation))
        .route("/simulations/{session_id}/retry", post(retry_simulation))
        .route("/simulations/{session_id}/run", post(run_simulation))
        .route("/simulations/{session_id}/send", post(send_as))
        .route("/simulations/{session_id}/messages", post(add_message))
        .route("/qa/ask", post(ask_expert))
        .route("/qa/reset", post(reset_qa))
        .route("/corpora", get(list_corpora))
        .route("/corpora/{name}", post(ingest_corpus))
        .route("/corpora/{name}/load", post(load_corpus))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Consultation Simulation Service",
        "version": "1.0.0",
        "description": "Doctor/patient dialogue simulation and retrieval-grounded expert QA",
        "endpoints": {
            "POST /simulations": "Start a new simulation",
            "GET /simulations/{session_id}": "Get status and history",
            "DELETE /simulations/{session_id}": "Discard a simulation",
            "POST /simulations/{session_id}/reset": "Restart with the same setup",
            "POST /simulations/{session_id}/opening": "Generate the opening turn",
            "POST /simulations/{session_id}/step": "Run one turn",
            "POST /simulations/{session_id}/retry": "Retry the last failed turn",
            "POST /simulations/{session_id}/run": "Run until the doctor concludes or a limit is hit",
            "POST /simulations/{session_id}/send": "Speak as one side and get the other side's reply",
            "POST /simulations/{session_id}/messages": "Append a message without a reply",
            "POST /qa/ask": "Ask the expert a question",
            "POST /qa/reset": "Clear the expert transcript",
            "GET /corpora": "List persisted corpora",
            "POST /corpora/{name}": "Index documents as a corpus",
            "POST /corpora/{name}/load": "Load a persisted corpus",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_simulation(
    State(state): State<AppState>,
    Json(request): Json<CreateSimulationRequest>,
) -> Result<(StatusCode, Json<SimulationResponse>), ApiError> {
    if request.patient_profile.trim().is_empty() {
        return Err(bad_request_error("Patient profile is required"));
    }

    let max_turns = request.max_turns.unwrap_or(state.config.max_turns);
    let instruction = request
        .doctor_instruction
        .unwrap_or_else(|| DEFAULT_DOCTOR_INSTRUCTION.to_string());
    let setup = SimulationSetup {
        patient_profile: request.patient_profile,
        doctor_instruction: with_termination_directive(&instruction, max_turns),
        grounding_text: request.grounding_text,
        max_turns,
    };

    let mut dialogue = DialogueOrchestrator::new(
        state.config.model.clone(),
        state.backend.clone(),
        state.rag.clone(),
    )
    .map_err(|e| bad_request_error(&e.to_string()))?;
    dialogue
        .initialize(setup)
        .await
        .map_err(|e| bad_request_error(&e.to_string()))?;

    let mut notice = None;
    if let Some(starter) = request.starter {
        if let Err(e) = dialogue.generate_opening(starter).await {
            warn!("Opening turn failed: {}", e);
            notice = Some(e.to_string());
        }
    }

    let snapshot = dialogue.snapshot();
    let session_id = state.storage.create(dialogue).await.map_err(consult_error)?;
    info!("Simulation {} started", session_id);

    Ok((
        StatusCode::CREATED,
        Json(SimulationResponse {
            session_id,
            snapshot,
            notice,
        }),
    ))
}

async fn load_dialogue(state: &AppState, session_id: &str) -> Result<SharedDialogue, ApiError> {
    match state.storage.get(session_id).await {
        Ok(Some(dialogue)) => Ok(dialogue),
        Ok(None) => Err(not_found_error("Session not found", session_id)),
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            Err(internal_error("Failed to load session", &e.to_string()))
        }
    }
}

async fn turn_response(
    state: &AppState,
    session_id: String,
    message: Option<consult_flow::Message>,
) -> ApiResult<TurnResponse> {
    let dialogue = load_dialogue(state, &session_id).await?;
    let dialogue = dialogue.lock().await;
    Ok(Json(TurnResponse {
        session_id,
        message,
        status: dialogue.status(),
        current_turn: dialogue.current_turn(),
    }))
}

async fn get_simulation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SimulationResponse> {
    let dialogue = load_dialogue(&state, &session_id).await?;
    let snapshot = dialogue.lock().await.snapshot();
    Ok(Json(SimulationResponse {
        session_id,
        snapshot,
        notice: None,
    }))
}

async fn delete_simulation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.storage.delete(&session_id).await {
        Ok(true) => {
            info!("Simulation {} deleted", session_id);
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(not_found_error("Session not found", &session_id)),
        Err(e) => Err(consult_error(e)),
    }
}

async fn reset_simulation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SimulationResponse> {
    let dialogue = load_dialogue(&state, &session_id).await?;
    let mut dialogue = dialogue.lock().await;
    dialogue.reset().await.map_err(consult_error)?;
    info!("Simulation {} reset", session_id);

    Ok(Json(SimulationResponse {
        session_id,
        snapshot: dialogue.snapshot(),
        notice: None,
    }))
}

async fn generate_opening(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<OpeningRequest>,
) -> ApiResult<TurnResponse> {
    let dialogue = load_dialogue(&state, &session_id).await?;
    let message = {
        let mut dialogue = dialogue.lock().await;
        dialogue
            .generate_opening(request.starter)
            .await
            .map_err(consult_error)?
    };
    turn_response(&state, session_id, Some(message)).await
}

async fn step_simulation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<TurnResponse> {
    let message = state
        .runner
        .step(&session_id)
        .await
        .map_err(consult_error)?;
    turn_response(&state, session_id, message).await
}

async fn retry_simulation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<TurnResponse> {
    let message = state
        .runner
        .retry(&session_id)
        .await
        .map_err(consult_error)?;
    turn_response(&state, session_id, message).await
}

async fn run_simulation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<RunResponse> {
    let outcome = state.runner.run(&session_id).await.map_err(consult_error)?;
    info!(
        "Simulation {} ran {} turns: {:?}",
        session_id,
        outcome.messages.len(),
        outcome.stop_reason
    );

    let dialogue = load_dialogue(&state, &session_id).await?;
    let dialogue = dialogue.lock().await;
    Ok(Json(RunResponse {
        session_id,
        outcome,
        status: dialogue.status(),
        current_turn: dialogue.current_turn(),
    }))
}

async fn send_as(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SendRequest>,
) -> ApiResult<TurnResponse> {
    if request.text.trim().is_empty() {
        return Err(bad_request_error("Message text cannot be empty"));
    }

    let dialogue = load_dialogue(&state, &session_id).await?;
    let message = {
        let mut dialogue = dialogue.lock().await;
        dialogue.send_as(request.role, &request.text).await
    };
    turn_response(&state, session_id, message).await
}

async fn add_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AddMessageRequest>,
) -> ApiResult<SimulationResponse> {
    let dialogue = load_dialogue(&state, &session_id).await?;
    let mut dialogue = dialogue.lock().await;
    dialogue.add_silent(request.role, request.text);

    Ok(Json(SimulationResponse {
        session_id,
        snapshot: dialogue.snapshot(),
        notice: None,
    }))
}

async fn ask_expert(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> ApiResult<QaExchange> {
    if request.question.trim().is_empty() {
        return Err(bad_request_error("Question cannot be empty"));
    }

    let mut qa = state.qa.lock().await;
    if let Some(instruction) = request.instruction {
        qa.set_instruction(instruction);
    }
    let retrieval = QaRetrieval {
        enabled: request.use_retrieval,
        similarity_threshold: request.similarity_threshold,
        top_k: request.top_k,
    };
    Ok(Json(qa.ask(&request.question, retrieval).await))
}

async fn reset_qa(State(state): State<AppState>) -> StatusCode {
    state.qa.lock().await.reset();
    StatusCode::NO_CONTENT
}

async fn list_corpora(State(state): State<AppState>) -> Json<CorporaResponse> {
    Json(CorporaResponse {
        corpora: state.rag.list_corpora().await,
        current: state.rag.current_corpus().await,
        status: state.rag.status().await,
    })
}

async fn ingest_corpus(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<consult_flow::IngestReport>), ApiError> {
    info!("Indexing {} documents into corpus {}", request.documents.len(), name);
    let report = state
        .rag
        .process_files(&name, request.documents)
        .await
        .map_err(|e| ingest_error(&e))?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn load_corpus(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<LoadCorpusResponse> {
    let chunks = state
        .rag
        .load_corpus(&name)
        .await
        .map_err(|e| ingest_error(&e))?;
    Ok(Json(LoadCorpusResponse {
        corpus: name,
        chunks,
    }))
}
