//! Recall Core Library
//!
//! Event-driven knowledge recall for AI agent sessions: an append-only
//! event stream with asynchronous per-subscriber fan-out, a microagent
//! registry loaded from well-known directories, and a recall engine
//! that answers recall requests with repository instructions and
//! keyword-triggered knowledge while honoring a per-user disabled list.

pub mod engine;
pub mod error;
pub mod events;
pub mod listing;
pub mod microagent;
pub mod registry;
pub mod telemetry;

pub use engine::{RecallEngine, RepositoryInfo};
pub use error::{RecallError, Result};
pub use events::{
    Event, EventHandler, EventPayload, EventSource, EventStream, MatchedMicroagent, RecallKind,
    StreamError, SubscriberId,
};
pub use listing::{list_microagents, MicroagentInfo};
pub use microagent::{
    load_microagents_from_dir, LoadError, McpStdioServer, McpToolsConfig, Microagent,
    MicroagentKind, MicroagentOrigin,
};
pub use registry::MicroagentRegistry;
pub use telemetry::init_tracing;
