use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorKind;

/// Author of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Doctor,
    Patient,
    Expert,
    User,
    /// Internal bookkeeping entries (tool output echoes, notices).
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "Doctor",
            Role::Patient => "Patient",
            Role::Expert => "Expert",
            Role::User => "User",
            Role::System => "System",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two model-driven sides of a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    Doctor,
    Patient,
}

impl Speaker {
    pub fn other(self) -> Speaker {
        match self {
            Speaker::Doctor => Speaker::Patient,
            Speaker::Patient => Speaker::Doctor,
        }
    }

    pub fn role(self) -> Role {
        match self {
            Speaker::Doctor => Role::Doctor,
            Speaker::Patient => Role::Patient,
        }
    }

    /// The side that answers a message authored by `role`.
    pub fn responding_to(role: Role) -> Speaker {
        match role {
            Role::Patient | Role::System => Speaker::Doctor,
            Role::Doctor | Role::Expert | Role::User => Speaker::Patient,
        }
    }
}

impl From<Speaker> for Role {
    fn from(speaker: Speaker) -> Self {
        speaker.role()
    }
}

/// A tool call a participant made while producing a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub result: String,
}

/// Why a message stands in for a failed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnFailure {
    pub kind: ErrorKind,
    pub detail: String,
}

/// A single history entry. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TurnFailure>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            error: None,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolInvocation>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Error-flagged entry standing in for a turn that could not be produced.
    pub fn failure(role: Role, kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            role,
            content: format!("Error: {detail}"),
            tool_calls: Vec::new(),
            error: Some(TurnFailure { kind, detail }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_responder_follows_last_role() {
        assert_eq!(Speaker::responding_to(Role::Patient), Speaker::Doctor);
        assert_eq!(Speaker::responding_to(Role::System), Speaker::Doctor);
        assert_eq!(Speaker::responding_to(Role::Doctor), Speaker::Patient);
        assert_eq!(Speaker::Doctor.other(), Speaker::Patient);
    }

    #[test]
    fn test_failure_message_carries_kind() {
        let message = Message::failure(Role::Doctor, ErrorKind::BackendCall, "timeout");
        assert!(message.is_error());
        assert_eq!(message.content, "Error: timeout");
        assert_eq!(message.error.unwrap().kind, ErrorKind::BackendCall);
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_value(Message::new(Role::Patient, "hello")).unwrap();
        assert_eq!(json["role"], "Patient");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("error").is_none());
    }
}
