//! Event data model and append-only event stream.

pub mod stream;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::microagent::{McpToolsConfig, MicroagentKind};

pub use stream::{EventHandler, EventStream, StreamError, StreamResult, SubscriberId};

/// Who produced an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    User,
    Agent,
    Environment,
}

/// Which flavor of recall a request asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecallKind {
    /// Repository instructions + tool config, available once workspace
    /// context (repository identity and directory) is known.
    WorkspaceContext,

    /// Knowledge microagents whose triggers appear in the query text.
    KeywordTrigger,
}

/// A knowledge microagent that matched a keyword recall.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchedMicroagent {
    pub name: String,
    pub kind: MicroagentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<String>>,
    /// Body text the upstream prompt builder injects into context.
    pub content: String,
}

/// Payload variants carried by events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Plain conversational message; observed but not acted on except
    /// as the query text source for keyword recall upstream.
    UserMessage { content: String },

    /// Ask the recall engine for relevant context.
    RecallRequest { query: String, kind: RecallKind },

    /// The engine's answer: repository instructions and/or matched
    /// knowledge microagents, either possibly empty.
    RecallResult {
        repo_instructions: String,
        matched_microagents: Vec<MatchedMicroagent>,
        mcp_tools: Vec<McpToolsConfig>,
    },
}

/// An immutable entry in the event stream.
///
/// Positions are unique and strictly increasing; an event is never
/// mutated or removed after append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub position: u64,
    pub source: EventSource,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Convenience accessor for recall results.
    pub fn as_recall_result(&self) -> Option<(&str, &[MatchedMicroagent], &[McpToolsConfig])> {
        match &self.payload {
            EventPayload::RecallResult {
                repo_instructions,
                matched_microagents,
                mcp_tools,
            } => Some((repo_instructions, matched_microagents, mcp_tools)),
            _ => None,
        }
    }
}
