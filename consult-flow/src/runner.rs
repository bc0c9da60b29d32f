//! Runners that drive a dialogue forward without a human in the loop.
//!
//! [`AutoRunner`] repeats [`DialogueOrchestrator::step`] until the doctor concludes, the doctor
//! has used up its turn budget, or a fixed iteration ceiling is hit. The ceiling applies no matter
//! how the model behaves, so a doctor that never emits the termination marker still halts.
//!
//! [`SessionRunner`] is the storage-aware wrapper for services: it loads a stored session, holds
//! its lock for the duration of the call and runs either one step or a full automatic run.
//!
//! ```rust,ignore
//! let runner = SessionRunner::new(storage.clone(), AutoRunner::new(20));
//! let next = runner.step(&session_id).await?;
//! let outcome = runner.run(&session_id).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::{
    error::{ConsultError, Result},
    message::Message,
    orchestrator::{DialogueOrchestrator, SimulationStatus},
    storage::DialogueStorage,
};

pub const DEFAULT_SAFETY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The termination marker was observed.
    Completed,
    /// The doctor's turn counter passed the configured budget.
    TurnBudgetReached,
    /// The iteration ceiling was hit first.
    SafetyLimit,
    /// The session was not running when the run started or stopped producing turns.
    NotRunning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub messages: Vec<Message>,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy)]
pub struct AutoRunner {
    safety_limit: usize,
}

impl Default for AutoRunner {
    fn default() -> Self {
        Self::new(DEFAULT_SAFETY_LIMIT)
    }
}

impl AutoRunner {
    pub fn new(safety_limit: usize) -> Self {
        Self { safety_limit }
    }

    pub fn safety_limit(&self) -> usize {
        self.safety_limit
    }

    /// Steps while running, while the turn counter is within budget and while fewer than
    /// `safety_limit` steps have run.
    ///
    /// The budget check happens before each step, so the doctor still answers the over-budget
    /// turn note once and gets the chance to conclude.
    pub async fn run(&self, dialogue: &mut DialogueOrchestrator) -> RunOutcome {
        let mut messages = Vec::new();
        let mut iterations = 0;

        while dialogue.status() == SimulationStatus::Running
            && dialogue.current_turn() <= dialogue.max_turns()
            && iterations < self.safety_limit
        {
            match dialogue.step().await {
                Some(message) => messages.push(message),
                None => break,
            }
            iterations += 1;
        }

        let stop_reason = match dialogue.status() {
            SimulationStatus::Completed => StopReason::Completed,
            SimulationStatus::Idle => StopReason::NotRunning,
            SimulationStatus::Running if dialogue.current_turn() > dialogue.max_turns() => {
                StopReason::TurnBudgetReached
            }
            SimulationStatus::Running if iterations >= self.safety_limit => StopReason::SafetyLimit,
            SimulationStatus::Running => StopReason::NotRunning,
        };

        info!(
            iterations,
            turn = dialogue.current_turn(),
            max_turns = dialogue.max_turns(),
            stop_reason = ?stop_reason,
            "automatic run stopped"
        );

        RunOutcome {
            messages,
            stop_reason,
        }
    }
}

/// Load → lock → step helper over any [`DialogueStorage`].
#[derive(Clone)]
pub struct SessionRunner {
    storage: Arc<dyn DialogueStorage>,
    auto: AutoRunner,
}

impl SessionRunner {
    pub fn new(storage: Arc<dyn DialogueStorage>, auto: AutoRunner) -> Self {
        Self { storage, auto }
    }

    /// Runs exactly one turn of the stored session.
    pub async fn step(&self, session_id: &str) -> Result<Option<Message>> {
        let dialogue = self.load(session_id).await?;
        let mut dialogue = dialogue.lock().await;
        Ok(dialogue.step().await)
    }

    pub async fn retry(&self, session_id: &str) -> Result<Option<Message>> {
        let dialogue = self.load(session_id).await?;
        let mut dialogue = dialogue.lock().await;
        Ok(dialogue.retry().await)
    }

    /// Runs the stored session automatically until it stops.
    pub async fn run(&self, session_id: &str) -> Result<RunOutcome> {
        let dialogue = self.load(session_id).await?;
        let mut dialogue = dialogue.lock().await;
        Ok(self.auto.run(&mut dialogue).await)
    }

    async fn load(&self, session_id: &str) -> Result<crate::storage::SharedDialogue> {
        self.storage
            .get(session_id)
            .await?
            .ok_or_else(|| ConsultError::SessionNotFound(session_id.to_string()))
    }
}
