use consult_flow::{
    DialogueSnapshot, Document, IndexStatus, Message, Role, RunOutcome, Speaker, SimulationStatus,
    qa::{DEFAULT_QA_THRESHOLD, DEFAULT_QA_TOP_K},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSimulationRequest {
    pub patient_profile: String,
    pub doctor_instruction: Option<String>,
    pub grounding_text: Option<String>,
    pub max_turns: Option<u32>,
    /// Generates the opening turn right away when set.
    pub starter: Option<Speaker>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpeningRequest {
    pub starter: Speaker,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendRequest {
    /// The side the human is playing.
    pub role: Speaker,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddMessageRequest {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub snapshot: DialogueSnapshot,
    /// Set when a requested opening could not be generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub message: Option<Message>,
    pub status: SimulationStatus,
    pub current_turn: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub status: SimulationStatus,
    pub current_turn: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub use_retrieval: bool,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Replaces the expert instruction for this and later questions.
    pub instruction: Option<String>,
}

fn default_threshold() -> f32 {
    DEFAULT_QA_THRESHOLD
}

fn default_top_k() -> usize {
    DEFAULT_QA_TOP_K
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestRequest {
    pub documents: Vec<Document>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CorporaResponse {
    pub corpora: Vec<String>,
    pub current: Option<String>,
    pub status: IndexStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadCorpusResponse {
    pub corpus: String,
    pub chunks: usize,
}
