use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::ChatBackend;
use crate::config::ModelConfig;
use crate::error::{ConfigError, ErrorKind};
use crate::message::{Message, Role};
use crate::participant::ConversationParticipant;
use crate::prompts::{DEFAULT_EXPERT_INSTRUCTION, expert_prompt};
use crate::retrieval::{RagManager, RetrievalSnippet};

pub const DEFAULT_QA_THRESHOLD: f32 = 0.7;
pub const DEFAULT_QA_TOP_K: usize = 3;

/// Retrieval settings for one question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QaRetrieval {
    pub enabled: bool,
    pub similarity_threshold: f32,
    pub top_k: usize,
}

impl Default for QaRetrieval {
    fn default() -> Self {
        Self {
            enabled: false,
            similarity_threshold: DEFAULT_QA_THRESHOLD,
            top_k: DEFAULT_QA_TOP_K,
        }
    }
}

impl QaRetrieval {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// One question with its answer and the snippets retrieved for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaExchange {
    pub question: String,
    pub answer: Message,
    /// Everything the retrieval boundary returned, shown as "referenced N fragments".
    pub snippets: Vec<RetrievalSnippet>,
}

/// Single-expert question answering with optional document grounding.
///
/// Every question goes to a freshly built, tool-less expert, so answers never depend on earlier
/// questions. The transcript is kept only for display.
pub struct QaSession {
    model: ModelConfig,
    backend: Arc<dyn ChatBackend>,
    rag: Arc<RagManager>,
    instruction: String,
    exchanges: Vec<QaExchange>,
}

impl QaSession {
    pub fn new(
        model: ModelConfig,
        backend: Arc<dyn ChatBackend>,
        rag: Arc<RagManager>,
    ) -> Result<Self, ConfigError> {
        model.validate()?;
        Ok(Self {
            model,
            backend,
            rag,
            instruction: DEFAULT_EXPERT_INSTRUCTION.to_string(),
            exchanges: Vec::new(),
        })
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn set_instruction(&mut self, instruction: impl Into<String>) {
        self.instruction = instruction.into();
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn exchanges(&self) -> &[QaExchange] {
        &self.exchanges
    }

    pub fn reset(&mut self) {
        self.exchanges.clear();
    }

    /// Answers `prompt`, prefixing a background block when retrieval is enabled and at least one
    /// snippet survives filtering. A backend failure becomes an error-flagged expert message.
    pub async fn ask(&mut self, prompt: &str, retrieval: QaRetrieval) -> QaExchange {
        let snippets = if retrieval.enabled {
            self.rag
                .retrieve(prompt, retrieval.similarity_threshold, retrieval.top_k)
                .await
        } else {
            Vec::new()
        };

        let background: Vec<&str> = snippets.iter().map(|s| s.text.as_str()).collect();
        let full_prompt = expert_prompt(prompt, &background);

        let mut expert = ConversationParticipant::new(
            Role::Expert,
            self.instruction.clone(),
            self.model.clone(),
            self.backend.clone(),
        );
        let answer = match expert.step(&full_prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "expert failed to answer");
                Message::failure(Role::Expert, ErrorKind::BackendCall, e.to_string())
            }
        };

        info!(
            retrieval = retrieval.enabled,
            snippets = snippets.len(),
            failed = answer.is_error(),
            "question answered"
        );

        let exchange = QaExchange {
            question: prompt.to_string(),
            answer,
            snippets,
        };
        self.exchanges.push(exchange.clone());
        exchange
    }
}
