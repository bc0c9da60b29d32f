//! Chat-completion backends.
//!
//! The core only needs one capability: send a system instruction, a replayed transcript and a
//! user message, optionally offering tools, and get back assistant text together with a record
//! of any tool calls made on the way.

pub mod openai_compatible;

use async_trait::async_trait;
use rig::tool::ToolDyn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{config::ModelConfig, error::BackendError, message::ToolInvocation};

pub use openai_compatible::OpenAiCompatibleBackend;

/// Tool offered to a participant.
pub type SharedTool = Arc<dyn ToolDyn>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// An entry of a participant's private transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub history: &'a [ChatMessage],
    pub user: &'a str,
    pub tools: &'a [SharedTool],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub tool_calls: Vec<ToolInvocation>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        model: &ModelConfig,
        request: ChatRequest<'_>,
    ) -> Result<ChatReply, BackendError>;
}
