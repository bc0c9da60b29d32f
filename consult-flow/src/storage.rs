use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{error::Result, orchestrator::DialogueOrchestrator};

/// A stored session. The mutex serializes every operation on one dialogue.
pub type SharedDialogue = Arc<Mutex<DialogueOrchestrator>>;

/// Trait for storing and retrieving dialogue sessions
#[async_trait]
pub trait DialogueStorage: Send + Sync {
    /// Stores a new dialogue and returns its generated id.
    async fn create(&self, dialogue: DialogueOrchestrator) -> Result<String>;
    async fn get(&self, id: &str) -> Result<Option<SharedDialogue>>;
    /// Returns whether a session was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
    async fn list(&self) -> Result<Vec<String>>;
}

/// In-memory implementation of DialogueStorage
#[derive(Default)]
pub struct InMemoryDialogueStorage {
    sessions: Arc<DashMap<String, SharedDialogue>>,
}

impl InMemoryDialogueStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl DialogueStorage for InMemoryDialogueStorage {
    async fn create(&self, dialogue: DialogueOrchestrator) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .insert(id.clone(), Arc::new(Mutex::new(dialogue)));
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<SharedDialogue>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::RagManager;
    use crate::test_support::{ScriptedBackend, StaticRetrieval, test_model};

    fn dialogue() -> DialogueOrchestrator {
        let rag = Arc::new(RagManager::new(Arc::new(StaticRetrieval::default())));
        DialogueOrchestrator::new(test_model(), Arc::new(ScriptedBackend::new()), rag).unwrap()
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let storage = InMemoryDialogueStorage::new();
        let id = storage.create(dialogue()).await.unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let stored = storage.get(&id).await.unwrap();
        assert!(stored.is_some());
        assert_eq!(storage.list().await.unwrap(), vec![id.clone()]);

        assert!(storage.delete(&id).await.unwrap());
        assert!(!storage.delete(&id).await.unwrap());
        assert!(storage.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_handles_share_one_session() {
        let storage = InMemoryDialogueStorage::new();
        let id = storage.create(dialogue()).await.unwrap();

        let first = storage.get(&id).await.unwrap().unwrap();
        first.lock().await.add_silent(crate::message::Role::User, "hi");

        let second = storage.get(&id).await.unwrap().unwrap();
        assert_eq!(second.lock().await.history().len(), 1);
    }
}
