//! Microagent data model and on-disk loader.
//!
//! A microagent is an immutable unit of instructional or knowledge text.
//! Repo microagents carry repository-level guidance (and optionally MCP
//! tool definitions); knowledge microagents carry trigger keywords that
//! activate them when the keyword appears in a query.

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{load_microagents_from_dir, LoadError, LoadResult};

/// Classification of a microagent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MicroagentKind {
    /// Repository-level instructions, always recalled once workspace
    /// context is known.
    Repo,

    /// Keyword-triggered knowledge.
    Knowledge,

    /// Task definition; loaded but never recalled by the engine.
    Task,
}

impl MicroagentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MicroagentKind::Repo => "repo",
            MicroagentKind::Knowledge => "knowledge",
            MicroagentKind::Task => "task",
        }
    }
}

/// Where a microagent was loaded from.
///
/// `Global` sorts before `User`, which the listing surface relies on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MicroagentOrigin {
    Global,
    User,
}

impl MicroagentOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            MicroagentOrigin::Global => "global",
            MicroagentOrigin::User => "user",
        }
    }
}

/// A single MCP stdio server definition carried by a repo microagent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpStdioServer {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Tool-invocation configuration attached to some repo microagents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpToolsConfig {
    #[serde(default)]
    pub stdio_servers: Vec<McpStdioServer>,
}

impl McpToolsConfig {
    /// A config with no servers contributes nothing to a recall result.
    pub fn is_empty(&self) -> bool {
        self.stdio_servers.is_empty()
    }
}

/// An immutable microagent record.
///
/// Created by the loader (or test helpers), owned by the registry for
/// the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Microagent {
    /// Unique name; the identifier used by the disabled list.
    pub name: String,

    /// Repo, knowledge, or task.
    pub kind: MicroagentKind,

    /// Body text injected into the agent's context when recalled.
    pub content: String,

    /// Which well-known source directory this came from.
    pub origin: MicroagentOrigin,

    /// Path of the file this microagent was loaded from.
    pub source: String,

    /// Trigger keywords. Meaningful only for `Knowledge`; empty otherwise.
    pub triggers: Vec<String>,

    /// MCP tool definitions. Only ever present on `Repo` microagents.
    pub mcp_tools: Option<McpToolsConfig>,
}

impl Microagent {
    /// Return the first trigger whose lowercase form is contained in the
    /// lowercased query, if any.
    ///
    /// Matching is raw substring containment, not word-boundary aware.
    pub fn match_trigger(&self, query: &str) -> Option<&str> {
        let query = query.to_lowercase();
        self.triggers
            .iter()
            .find(|t| !t.is_empty() && query.contains(&t.to_lowercase()))
            .map(|t| t.as_str())
    }
}
