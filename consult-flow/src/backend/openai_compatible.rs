//! Backend for any server speaking the OpenAI chat-completions format (OpenAI, DashScope
//! compatible mode, vLLM, LM Studio, ...), built on rig's OpenAI provider.
//!
//! Tool calls are resolved locally: the model's requested calls are dispatched to the offered
//! tools, their output is sent back as tool results, and the exchange repeats until the model
//! answers with plain text or [`MAX_TOOL_ROUNDS`] is exhausted.

use async_trait::async_trait;
use dashmap::DashMap;
use rig::OneOrMany;
use rig::completion::{AssistantContent, CompletionModel as _, Message, ToolDefinition};
use rig::providers::openai;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use super::{ChatBackend, ChatMessage, ChatReply, ChatRequest, ChatRole, SharedTool};
use crate::{config::ModelConfig, error::BackendError, message::ToolInvocation};

pub const MAX_TOOL_ROUNDS: usize = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct OpenAiCompatibleBackend {
    http: reqwest::Client,
    // keyed by (endpoint, credential)
    clients: DashMap<(String, String), openai::Client>,
}

impl OpenAiCompatibleBackend {
    pub fn new() -> Result<Self, BackendError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Transport-level timeout; the core itself has no cancellation.
    pub fn with_timeout(timeout: Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;
        Ok(Self {
            http,
            clients: DashMap::new(),
        })
    }

    fn client(&self, model: &ModelConfig) -> Result<openai::Client, BackendError> {
        let key = (model.endpoint().to_string(), model.api_key.clone());
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let client = openai::Client::builder(&model.api_key)
            .base_url(model.endpoint())
            .custom_client(self.http.clone())
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    async fn complete(
        &self,
        model: &ModelConfig,
        request: ChatRequest<'_>,
    ) -> Result<ChatReply, BackendError> {
        // Chat-completions model, not rig's default Responses API one
        let completion_model = openai::completion::CompletionModel::new(self.client(model)?, &model.model);
        let temperature = f64::from(model.temperature);
        let system = request.system;

        resolve_tool_calls(&request, |mut conversation, tools| {
            let completion_model = completion_model.clone();
            async move {
                let prompt = conversation
                    .pop()
                    .ok_or_else(|| BackendError::InvalidResponse("empty conversation".into()))?;
                let response = completion_model
                    .completion_request(prompt)
                    .preamble(system.to_string())
                    .messages(conversation)
                    .tools(tools)
                    .temperature(temperature)
                    .send()
                    .await?;
                Ok::<_, BackendError>(response.choice.into_iter().collect())
            }
        })
        .await
    }
}

/// Drives the tool loop over `send`, which performs one completion round trip for the given
/// conversation (prompt last) and tool definitions.
///
/// Every executed call is recorded, in order, on the returned reply. Calls to tools that were
/// not offered or that fail are answered with an error text so the model can recover.
pub async fn resolve_tool_calls<F, Fut>(
    request: &ChatRequest<'_>,
    mut send: F,
) -> Result<ChatReply, BackendError>
where
    F: FnMut(Vec<Message>, Vec<ToolDefinition>) -> Fut,
    Fut: Future<Output = Result<Vec<AssistantContent>, BackendError>>,
{
    let mut conversation: Vec<Message> = request.history.iter().map(to_rig_message).collect();
    conversation.push(Message::user(request.user));

    let mut definitions = Vec::with_capacity(request.tools.len());
    for tool in request.tools {
        definitions.push(tool.definition(request.user.to_string()).await);
    }

    let mut invocations = Vec::new();
    for _ in 0..=MAX_TOOL_ROUNDS {
        let choice = send(conversation.clone(), definitions.clone()).await?;

        let mut text = String::new();
        let mut calls = Vec::new();
        for content in &choice {
            match content {
                AssistantContent::Text(part) => text.push_str(&part.text),
                AssistantContent::ToolCall(call) => calls.push(call.clone()),
                _ => {}
            }
        }

        if calls.is_empty() || request.tools.is_empty() {
            return Ok(ChatReply {
                content: text,
                tool_calls: invocations,
            });
        }

        let content = OneOrMany::many(choice)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        conversation.push(Message::Assistant { id: None, content });

        for call in calls {
            let result = dispatch(request.tools, &call.function.name, &call.function.arguments).await;
            invocations.push(ToolInvocation {
                tool_name: call.function.name.clone(),
                arguments: arguments_map(&call.function.arguments),
                result: result.clone(),
            });
            conversation.push(Message::tool_result(call.id, result));
        }
    }

    Err(BackendError::ToolRoundsExceeded(MAX_TOOL_ROUNDS))
}

fn to_rig_message(entry: &ChatMessage) -> Message {
    match entry.role {
        ChatRole::User => Message::user(entry.content.clone()),
        ChatRole::Assistant => Message::assistant(entry.content.clone()),
    }
}

async fn dispatch(tools: &[SharedTool], name: &str, arguments: &Value) -> String {
    let Some(tool) = tools.iter().find(|tool| tool.name() == name) else {
        warn!(tool = %name, "model requested an unknown tool");
        return format!("unknown tool: {name}");
    };

    info!(tool = %name, arguments = %arguments, "invoking tool");
    let arguments = match arguments {
        Value::Null => "{}".to_string(),
        // Some servers send the arguments as a JSON-encoded string
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };

    match tool.call(arguments).await {
        Ok(output) => unquote(output),
        Err(e) => {
            warn!(tool = %name, error = %e, "tool call failed");
            format!("tool error: {e}")
        }
    }
}

// Tool output arrives JSON-encoded; plain string outputs are unwrapped for readability.
fn unquote(output: String) -> String {
    serde_json::from_str::<String>(&output).unwrap_or(output)
}

fn arguments_map(arguments: &Value) -> Map<String, Value> {
    match arguments {
        Value::Object(map) => map.clone(),
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_default(),
        _ => Map::new(),
    }
}
