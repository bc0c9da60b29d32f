//! Turn-taking state machine for a doctor/patient simulation.
//!
//! The orchestrator owns the shared history. Each turn picks the responder from the author of the
//! last entry, forwards that entry's text (with a turn-budget note when the doctor is
//! next) to the responder, strips the termination marker from the reply and appends the result.
//!
//! ```text
//! Idle --initialize--> Running --marker observed--> Completed
//!                        ^                              |
//!                        +------- initialize/reset -----+
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{ChatBackend, SharedTool};
use crate::config::ModelConfig;
use crate::error::{ConfigError, ConsultError, ErrorKind, Result};
use crate::markers::{annotate_turn, strip_termination};
use crate::message::{Message, Role, Speaker};
use crate::participant::ConversationParticipant;
use crate::prompts::{
    DEFAULT_DOCTOR_INSTRUCTION, PATIENT_OPENING_PROMPT, doctor_instruction, doctor_opening,
    patient_instruction,
};
use crate::retrieval::RagManager;
use crate::tools::SearchRecordsTool;

pub const DEFAULT_MAX_TURNS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Idle,
    Running,
    Completed,
}

/// Everything needed to (re)start a simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSetup {
    pub patient_profile: String,
    #[serde(default = "default_doctor_instruction")]
    pub doctor_instruction: String,
    /// Per-session document indexed ephemerally for the doctor's records tool.
    #[serde(default)]
    pub grounding_text: Option<String>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_doctor_instruction() -> String {
    DEFAULT_DOCTOR_INSTRUCTION.to_string()
}

fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

impl SimulationSetup {
    pub fn new(
        patient_profile: impl Into<String>,
        doctor_instruction: impl Into<String>,
        max_turns: u32,
    ) -> Self {
        Self {
            patient_profile: patient_profile.into(),
            doctor_instruction: doctor_instruction.into(),
            grounding_text: None,
            max_turns,
        }
    }

    pub fn with_grounding(mut self, text: impl Into<String>) -> Self {
        self.grounding_text = Some(text.into());
        self
    }
}

/// Serializable view of a session for callers that render it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueSnapshot {
    pub status: SimulationStatus,
    pub current_turn: u32,
    pub max_turns: u32,
    pub records_tool: bool,
    pub history: Vec<Message>,
}

struct Participants {
    doctor: ConversationParticipant,
    patient: ConversationParticipant,
}

impl Participants {
    fn get_mut(&mut self, speaker: Speaker) -> &mut ConversationParticipant {
        match speaker {
            Speaker::Doctor => &mut self.doctor,
            Speaker::Patient => &mut self.patient,
        }
    }
}

pub struct DialogueOrchestrator {
    model: ModelConfig,
    backend: Arc<dyn ChatBackend>,
    rag: Arc<RagManager>,
    setup: Option<SimulationSetup>,
    participants: Option<Participants>,
    history: Vec<Message>,
    status: SimulationStatus,
    current_turn: u32,
    max_turns: u32,
}

impl DialogueOrchestrator {
    /// Fails fast when `model` cannot reach a backend.
    pub fn new(
        model: ModelConfig,
        backend: Arc<dyn ChatBackend>,
        rag: Arc<RagManager>,
    ) -> std::result::Result<Self, ConfigError> {
        model.validate()?;
        Ok(Self {
            model,
            backend,
            rag,
            setup: None,
            participants: None,
            history: Vec::new(),
            status: SimulationStatus::Idle,
            current_turn: 0,
            max_turns: DEFAULT_MAX_TURNS,
        })
    }

    /// Starts a fresh simulation, discarding any previous history, counter and participant memory.
    ///
    /// A non-blank grounding text gives the doctor a `search_records` tool over an ephemeral
    /// index. If that index cannot be built the doctor simply runs without the tool.
    pub async fn initialize(
        &mut self,
        setup: SimulationSetup,
    ) -> std::result::Result<(), ConfigError> {
        if setup.max_turns == 0 {
            return Err(ConfigError::InvalidTurnBudget);
        }

        let grounding = setup
            .grounding_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let grounded = grounding.is_some();

        let records_tool = match grounding {
            Some(text) => self.rag.create_ephemeral(text).await.map(|index| {
                Arc::new(SearchRecordsTool::new(self.rag.clone(), index)) as SharedTool
            }),
            None => None,
        };

        let mut doctor = ConversationParticipant::new(
            Role::Doctor,
            doctor_instruction(&setup.doctor_instruction, grounded),
            self.model.clone(),
            self.backend.clone(),
        );
        if let Some(tool) = records_tool {
            doctor = doctor.with_tool(tool);
        }
        let patient = ConversationParticipant::new(
            Role::Patient,
            patient_instruction(&setup.patient_profile),
            self.model.clone(),
            self.backend.clone(),
        );

        info!(
            max_turns = setup.max_turns,
            grounded,
            records_tool = doctor.has_tools(),
            "simulation initialized"
        );

        self.participants = Some(Participants { doctor, patient });
        self.history.clear();
        self.current_turn = 0;
        self.max_turns = setup.max_turns;
        self.status = SimulationStatus::Running;
        self.setup = Some(setup);
        Ok(())
    }

    /// Re-initializes with the most recent setup.
    pub async fn reset(&mut self) -> Result<()> {
        let setup = self.setup.clone().ok_or(ConsultError::NotInitialized)?;
        self.initialize(setup).await?;
        Ok(())
    }

    /// Produces the first turn. A doctor opening consumes turn 1 of the budget; a patient
    /// opening consumes nothing. Nothing is appended if the backend call fails.
    pub async fn generate_opening(&mut self, starter: Speaker) -> Result<Message> {
        if self.participants.is_none() {
            return Err(ConsultError::NotInitialized);
        }
        if self.status != SimulationStatus::Running {
            return Err(ConsultError::NotRunning);
        }

        let prompt = match starter {
            Speaker::Doctor => {
                self.current_turn = 1;
                doctor_opening(self.max_turns)
            }
            Speaker::Patient => PATIENT_OPENING_PROMPT.to_string(),
        };

        let participants = self
            .participants
            .as_mut()
            .ok_or(ConsultError::NotInitialized)?;
        let reply = participants.get_mut(starter).step(&prompt).await?;

        info!(role = %starter.role(), turn = self.current_turn, "opening generated");
        Ok(self.finish_turn(reply))
    }

    /// Runs one turn. Returns `None` unless the session is running.
    ///
    /// A backend failure is appended as an error-flagged message under the responder's role and
    /// the session stays running. Like any other entry it hands the turn to the other side; use
    /// [`retry`](Self::retry) to have the failed side try again instead.
    pub async fn step(&mut self) -> Option<Message> {
        if self.status != SimulationStatus::Running {
            return None;
        }

        let last = self.history.last().map(|m| (m.role, m.content.clone()));

        let Some((last_role, last_content)) = last else {
            let message = match self.generate_opening(Speaker::Doctor).await {
                Ok(message) => message,
                Err(e) => self.record_failure(Role::Doctor, e.kind(), e.to_string()),
            };
            return Some(message);
        };

        let responder = Speaker::responding_to(last_role);
        let prompt = self.prompt_for(responder, &last_content);
        Some(self.respond(responder, &prompt).await)
    }

    /// Re-prompts the side whose turn failed with the entry it was answering.
    ///
    /// Returns `None` unless the session is running and the last entry is error-flagged. A doctor
    /// retry reuses the turn the failed attempt already consumed.
    pub async fn retry(&mut self) -> Option<Message> {
        if self.status != SimulationStatus::Running {
            return None;
        }

        let failed = self.history.last().filter(|m| m.is_error())?;
        let responder = match failed.role {
            Role::Doctor => Speaker::Doctor,
            Role::Patient => Speaker::Patient,
            _ => return None,
        };
        let answered = self
            .history
            .iter()
            .rev()
            .find(|m| !m.is_error())
            .map(|m| m.content.clone());

        let prompt = match (responder, answered) {
            (Speaker::Doctor, Some(text)) => annotate_turn(&text, self.current_turn, self.max_turns),
            (Speaker::Doctor, None) => doctor_opening(self.max_turns),
            (Speaker::Patient, Some(text)) => text,
            (Speaker::Patient, None) => PATIENT_OPENING_PROMPT.to_string(),
        };

        info!(role = %responder.role(), turn = self.current_turn, "retrying failed turn");
        Some(self.respond(responder, &prompt).await)
    }

    /// Human-in-the-loop turn: records `text` under `author`, then lets the other side answer.
    /// Returns `None` and records nothing unless the session is running.
    ///
    /// A doctor-authored text consumes a turn just as a model doctor reply does, so the counter
    /// tracks doctor entries regardless of who wrote them.
    pub async fn send_as(&mut self, author: Speaker, text: &str) -> Option<Message> {
        if self.status != SimulationStatus::Running {
            return None;
        }

        if author == Speaker::Doctor {
            self.current_turn += 1;
        }
        self.history.push(Message::new(author.role(), text));
        let responder = author.other();
        let prompt = self.prompt_for(responder, text);
        Some(self.respond(responder, &prompt).await)
    }

    /// Appends a message without triggering any response.
    pub fn add_silent(&mut self, role: Role, text: impl Into<String>) {
        self.history.push(Message::new(role, text));
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn status(&self) -> SimulationStatus {
        self.status
    }

    pub fn current_turn(&self) -> u32 {
        self.current_turn
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn setup(&self) -> Option<&SimulationSetup> {
        self.setup.as_ref()
    }

    pub fn has_records_tool(&self) -> bool {
        self.participants
            .as_ref()
            .is_some_and(|p| p.doctor.has_tools())
    }

    pub fn snapshot(&self) -> DialogueSnapshot {
        DialogueSnapshot {
            status: self.status,
            current_turn: self.current_turn,
            max_turns: self.max_turns,
            records_tool: self.has_records_tool(),
            history: self.history.clone(),
        }
    }

    // Doctor-bound prompts consume one turn of the budget and carry the turn note.
    fn prompt_for(&mut self, responder: Speaker, text: &str) -> String {
        match responder {
            Speaker::Doctor => {
                self.current_turn += 1;
                annotate_turn(text, self.current_turn, self.max_turns)
            }
            Speaker::Patient => text.to_string(),
        }
    }

    async fn respond(&mut self, responder: Speaker, prompt: &str) -> Message {
        let Some(participants) = self.participants.as_mut() else {
            return self.record_failure(
                responder.role(),
                ErrorKind::Configuration,
                ConsultError::NotInitialized.to_string(),
            );
        };

        match participants.get_mut(responder).step(prompt).await {
            Ok(reply) => {
                info!(
                    role = %responder.role(),
                    turn = self.current_turn,
                    tool_calls = reply.tool_calls.len(),
                    "turn completed"
                );
                self.finish_turn(reply)
            }
            Err(e) => {
                warn!(role = %responder.role(), turn = self.current_turn, error = %e, "turn failed");
                self.record_failure(responder.role(), ErrorKind::BackendCall, e.to_string())
            }
        }
    }

    fn finish_turn(&mut self, mut reply: Message) -> Message {
        let (visible, done) = strip_termination(&reply.content);
        reply.content = visible;
        if done {
            self.status = SimulationStatus::Completed;
            info!(
                role = %reply.role,
                turn = self.current_turn,
                messages = self.history.len() + 1,
                "diagnosis reached, simulation completed"
            );
        }
        self.history.push(reply.clone());
        reply
    }

    fn record_failure(&mut self, role: Role, kind: ErrorKind, detail: String) -> Message {
        let message = Message::failure(role, kind, detail);
        self.history.push(message.clone());
        message
    }
}
