use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{ChatBackend, ChatMessage, ChatRequest, SharedTool};
use crate::config::ModelConfig;
use crate::error::BackendError;
use crate::message::{Message, Role};

/// Upper bound on the private transcript a participant replays with each request.
pub const MAX_MEMORY_MESSAGES: usize = 50;

/// One side of a conversation: a fixed instruction bound to a model and optional tools.
///
/// A participant never touches session history. It only remembers its own successful exchanges,
/// trimmed to the most recent [`MAX_MEMORY_MESSAGES`] entries.
pub struct ConversationParticipant {
    role: Role,
    instruction: String,
    model: ModelConfig,
    backend: Arc<dyn ChatBackend>,
    tools: Vec<SharedTool>,
    memory: Vec<ChatMessage>,
}

impl ConversationParticipant {
    pub fn new(
        role: Role,
        instruction: impl Into<String>,
        model: ModelConfig,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            role,
            instruction: instruction.into(),
            model,
            backend,
            tools: Vec::new(),
            memory: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: SharedTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn memory(&self) -> &[ChatMessage] {
        &self.memory
    }

    /// Sends `input` as the user turn and returns the reply authored under this participant's
    /// role, with any tool calls made along the way.
    pub async fn step(&mut self, input: &str) -> Result<Message, BackendError> {
        debug!(role = %self.role, memory = self.memory.len(), "participant step");
        let reply = self
            .backend
            .complete(
                &self.model,
                ChatRequest {
                    system: &self.instruction,
                    history: &self.memory,
                    user: input,
                    tools: &self.tools,
                },
            )
            .await?;

        if !reply.tool_calls.is_empty() {
            info!(
                role = %self.role,
                calls = reply.tool_calls.len(),
                "participant used tools"
            );
        }

        self.remember(ChatMessage::user(input));
        self.remember(ChatMessage::assistant(reply.content.clone()));

        Ok(Message::new(self.role, reply.content).with_tool_calls(reply.tool_calls))
    }

    fn remember(&mut self, entry: ChatMessage) {
        self.memory.push(entry);
        if self.memory.len() > MAX_MEMORY_MESSAGES {
            let excess = self.memory.len() - MAX_MEMORY_MESSAGES;
            self.memory.drain(..excess);
        }
    }
}
