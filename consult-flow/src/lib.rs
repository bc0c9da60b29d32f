pub mod backend;
pub mod config;
pub mod error;
pub mod markers;
pub mod message;
pub mod orchestrator;
pub mod participant;
pub mod prompts;
pub mod qa;
pub mod retrieval;
pub mod runner;
pub mod storage;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use backend::{ChatBackend, ChatMessage, ChatReply, ChatRequest, OpenAiCompatibleBackend};
pub use config::{ModelConfig, RetrievalConfig};
pub use error::{
    BackendError, ConfigError, ConsultError, ErrorKind, IngestError, QueryError, Result,
};
pub use markers::{TERMINATION_MARKER, parse_turn_note, strip_termination};
pub use message::{Message, Role, Speaker, ToolInvocation, TurnFailure};
pub use orchestrator::{DialogueOrchestrator, DialogueSnapshot, SimulationSetup, SimulationStatus};
pub use participant::ConversationParticipant;
pub use qa::{QaExchange, QaRetrieval, QaSession};
pub use retrieval::{
    Document, IndexHandle, IndexStatus, IngestReport, OpenAiCompatibleEmbedder, RagManager,
    RetrievalContract, RetrievalSnippet, VectorRetriever,
};
pub use runner::{AutoRunner, RunOutcome, SessionRunner, StopReason};
pub use storage::{DialogueStorage, InMemoryDialogueStorage, SharedDialogue};
pub use tools::{SearchRecordsTool, search_records};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use crate::test_support::{HashingEmbedder, test_model};

    /// Doctor looks up the records once per turn; patient just talks.
    struct RecordsCheckingBackend;

    #[async_trait]
    impl ChatBackend for RecordsCheckingBackend {
        async fn complete(
            &self,
            _model: &ModelConfig,
            request: ChatRequest<'_>,
        ) -> std::result::Result<ChatReply, BackendError> {
            let Some(tool) = request.tools.first() else {
                return Ok(ChatReply::text("My stomach hurts after meals."));
            };

            let arguments = r#"{"query":"gastroscopy antrum","similarity_threshold":0.1}"#;
            let output = tool.call(arguments.to_string()).await.unwrap_or_default();
            let result: String = serde_json::from_str(&output).unwrap_or(output);

            Ok(ChatReply {
                content: format!("The report says: {result} {TERMINATION_MARKER}"),
                tool_calls: vec![ToolInvocation {
                    tool_name: tool.name(),
                    arguments: serde_json::from_str(arguments).unwrap(),
                    result,
                }],
            })
        }
    }

    #[tokio::test]
    async fn test_grounded_simulation_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = RetrievalConfig {
            data_dir: dir.path().to_path_buf(),
            ..RetrievalConfig::default()
        };
        let retriever = VectorRetriever::new(Arc::new(HashingEmbedder), &config);
        let rag = Arc::new(RagManager::new(Arc::new(retriever)));

        let mut dialogue =
            DialogueOrchestrator::new(test_model(), Arc::new(RecordsCheckingBackend), rag)
                .unwrap();
        dialogue
            .initialize(
                SimulationSetup::new("45-year-old with epigastric pain", "You are a GP.", 3)
                    .with_grounding("gastroscopy antrum erosion\n\ncholesterol normal"),
            )
            .await
            .unwrap();

        dialogue.generate_opening(Speaker::Patient).await.unwrap();
        let outcome = AutoRunner::default().run(&mut dialogue).await;

        assert_eq!(outcome.stop_reason, StopReason::Completed);
        let verdict = dialogue.history().last().unwrap();
        assert_eq!(verdict.role, Role::Doctor);
        assert!(!verdict.content.contains(TERMINATION_MARKER));
        assert_eq!(verdict.tool_calls.len(), 1);
        assert_eq!(verdict.tool_calls[0].tool_name, "search_records");
        assert!(verdict.tool_calls[0].result.starts_with("gastroscopy antrum erosion"));
        assert_eq!(dialogue.current_turn(), 1);

        // Ephemeral grounding never reaches the corpus directory.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
