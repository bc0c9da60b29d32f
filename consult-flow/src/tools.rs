//! Records search exposed to the Doctor participant as a callable tool.

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;

use crate::retrieval::{IndexHandle, RagManager, format_snippets};

pub const SEARCH_RECORDS_TOOL: &str = "search_records";
pub const DEFAULT_TOOL_TOP_K: usize = 3;
pub const DEFAULT_TOOL_THRESHOLD: f32 = 0.5;
pub const RECORDS_NOT_FOUND: &str = "no relevant records found";

/// Searches `index` and renders the informative hits for an agent, best-first, separated by a
/// blank line. Never fails and never returns an empty string.
pub async fn search_records(
    rag: &RagManager,
    index: &IndexHandle,
    query: &str,
    top_k: usize,
    similarity_threshold: f32,
) -> String {
    let snippets = rag
        .retrieve_from(index, query, similarity_threshold, top_k)
        .await;
    let text = format_snippets(&snippets, "\n\n");

    info!(query = %query, hits = snippets.len(), "records searched");
    if text.is_empty() {
        RECORDS_NOT_FOUND.to_string()
    } else {
        text
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRecordsArgs {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
}

fn default_top_k() -> usize {
    DEFAULT_TOOL_TOP_K
}

fn default_threshold() -> f32 {
    DEFAULT_TOOL_THRESHOLD
}

/// `search_records` bound to one session's grounding index.
#[derive(Clone)]
pub struct SearchRecordsTool {
    rag: Arc<RagManager>,
    index: IndexHandle,
}

impl SearchRecordsTool {
    pub fn new(rag: Arc<RagManager>, index: IndexHandle) -> Self {
        Self { rag, index }
    }
}

impl Tool for SearchRecordsTool {
    const NAME: &'static str = SEARCH_RECORDS_TOOL;

    type Error = Infallible;
    type Args = SearchRecordsArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: SEARCH_RECORDS_TOOL.to_string(),
            description: "Search the patient's medical records and examination reports for \
                          specific facts. Use it only for factual lookups such as test values, \
                          history or report findings."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The question or keywords to look up"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Maximum number of passages to return",
                        "default": DEFAULT_TOOL_TOP_K
                    },
                    "similarity_threshold": {
                        "type": "number",
                        "description": "Minimum similarity in [0, 1]; lower values widen recall",
                        "default": DEFAULT_TOOL_THRESHOLD
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(search_records(
            &self.rag,
            &self.index,
            &args.query,
            args.top_k,
            args.similarity_threshold,
        )
        .await)
    }
}
