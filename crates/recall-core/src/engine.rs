//! The recall engine: an event-stream subscriber that answers recall
//! requests with repository instructions and matched knowledge.
//!
//! Subscribes itself at construction and reacts to `RecallRequest`
//! events by appending exactly one `RecallResult` per request. The
//! per-user disabled list is applied at every assembly point through a
//! single predicate, so a disabled microagent can never contribute
//! body text, trigger matches, or tool configuration.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::events::{
    Event, EventHandler, EventPayload, EventSource, EventStream, MatchedMicroagent, RecallKind,
    SubscriberId,
};
use crate::microagent::{McpToolsConfig, Microagent};
use crate::registry::MicroagentRegistry;

/// Workspace context required before workspace recalls can succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Repository identity, e.g. `owner/repo`.
    pub name: String,
    /// Working directory the repository is checked out in.
    pub directory: String,
}

/// Event-driven recall engine for one session.
pub struct RecallEngine {
    stream: Arc<EventStream>,
    sid: String,
    /// Microagent names suppressed from all recall output. Immutable
    /// after construction.
    disabled: HashSet<String>,
    registry: RwLock<MicroagentRegistry>,
    repository_info: RwLock<Option<RepositoryInfo>>,
    subscription: SubscriberId,
}

impl RecallEngine {
    /// Create an engine and subscribe it to the stream.
    ///
    /// `disabled` is the per-user exclusion list; `None` and an empty
    /// list both mean "nothing disabled". Must be called from within a
    /// tokio runtime (the subscription spawns a delivery worker).
    pub fn new(
        stream: Arc<EventStream>,
        sid: impl Into<String>,
        disabled: Option<Vec<String>>,
    ) -> Arc<Self> {
        let disabled: HashSet<String> = disabled.unwrap_or_default().into_iter().collect();

        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let subscription = stream.subscribe(Arc::new(WeakHandler {
                engine: weak.clone(),
            }));
            Self {
                stream: stream.clone(),
                sid: sid.into(),
                disabled,
                registry: RwLock::new(MicroagentRegistry::new()),
                repository_info: RwLock::new(None),
                subscription,
            }
        })
    }

    /// Populate the registry from the two well-known source directories.
    ///
    /// Missing directories degrade to zero microagents from that origin.
    pub async fn load_microagents(&self, global_dir: &Path, user_dir: &Path) {
        let registry = MicroagentRegistry::load(global_dir, user_dir);
        *self.registry.write().await = registry;
    }

    /// Administrative overwrite of the repo microagent map.
    pub async fn replace_repo_microagents(&self, repo: BTreeMap<String, Microagent>) {
        self.registry.write().await.replace_repo(repo);
    }

    /// Administrative overwrite of the knowledge microagent map.
    pub async fn replace_knowledge_microagents(&self, knowledge: BTreeMap<String, Microagent>) {
        self.registry.write().await.replace_knowledge(knowledge);
    }

    /// Set the workspace context. Workspace recalls arriving before
    /// this call are deferred no-ops.
    pub async fn set_repository_info(&self, name: impl Into<String>, directory: impl Into<String>) {
        *self.repository_info.write().await = Some(RepositoryInfo {
            name: name.into(),
            directory: directory.into(),
        });
    }

    /// Stop reacting to events. The engine appends nothing afterwards.
    pub fn detach(&self) {
        self.stream.unsubscribe(self.subscription);
    }

    /// The single exclusion predicate. Every assembly path consults
    /// this and nothing else.
    fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    /// Knowledge microagents whose triggers appear in `query`,
    /// registry order, disabled ones filtered, each at most once.
    pub async fn find_microagent_knowledge(&self, query: &str) -> Vec<MatchedMicroagent> {
        let registry = self.registry.read().await;
        registry
            .knowledge_microagents()
            .filter(|agent| !self.is_disabled(&agent.name))
            .filter_map(|agent| {
                agent.match_trigger(query).map(|trigger| {
                    debug!(agent = %agent.name, trigger, "knowledge microagent triggered");
                    MatchedMicroagent {
                        name: agent.name.clone(),
                        kind: agent.kind,
                        triggers: Some(agent.triggers.clone()),
                        content: agent.content.clone(),
                    }
                })
            })
            .collect()
    }

    /// Instructions and tool configs of the surviving repo microagents,
    /// computed under one registry read lock so the pair reflects a
    /// single registry state even if an administrative overwrite lands
    /// mid-recall.
    async fn workspace_snapshot(&self) -> (String, Vec<McpToolsConfig>) {
        let registry = self.registry.read().await;
        let surviving: Vec<&Microagent> = registry
            .repo_microagents()
            .filter(|agent| !self.is_disabled(&agent.name))
            .collect();

        let repo_instructions = surviving
            .iter()
            .map(|agent| agent.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let mcp_tools = surviving
            .iter()
            .filter_map(|agent| agent.mcp_tools.clone())
            .filter(|tools| !tools.is_empty())
            .collect();

        (repo_instructions, mcp_tools)
    }

    /// Tool configurations of surviving repo microagents only, registry
    /// order. A disabled microagent's config never appears here, even
    /// if a surviving one carries an identical value.
    pub async fn microagent_mcp_tools(&self) -> Vec<McpToolsConfig> {
        let registry = self.registry.read().await;
        registry
            .repo_microagents()
            .filter(|agent| !self.is_disabled(&agent.name))
            .filter_map(|agent| agent.mcp_tools.clone())
            .filter(|tools| !tools.is_empty())
            .collect()
    }

    #[instrument(skip(self), fields(sid = %self.sid))]
    async fn on_workspace_recall(&self) {
        if self.repository_info.read().await.is_none() {
            // Deferred no-op: upstream must set context and resend.
            debug!("workspace recall before repository info is set, skipping");
            return;
        }

        let (repo_instructions, mcp_tools) = self.workspace_snapshot().await;

        self.emit_result(EventPayload::RecallResult {
            repo_instructions,
            matched_microagents: Vec::new(),
            mcp_tools,
        });
    }

    #[instrument(skip(self, query), fields(sid = %self.sid))]
    async fn on_keyword_recall(&self, query: &str) {
        let matched_microagents = self.find_microagent_knowledge(query).await;

        // An empty match set is still a valid, single result.
        self.emit_result(EventPayload::RecallResult {
            repo_instructions: String::new(),
            matched_microagents,
            mcp_tools: Vec::new(),
        });
    }

    fn emit_result(&self, payload: EventPayload) {
        if let Err(e) = self.stream.append(EventSource::Environment, payload) {
            warn!(error = %e, sid = %self.sid, "failed to append recall result");
        }
    }
}

/// Subscription shim holding a weak reference so the stream's delivery
/// worker does not keep a detached engine alive.
struct WeakHandler {
    engine: std::sync::Weak<RecallEngine>,
}

#[async_trait]
impl EventHandler for WeakHandler {
    async fn on_event(&self, event: Event) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        if let EventPayload::RecallRequest { query, kind } = &event.payload {
            match kind {
                RecallKind::WorkspaceContext => engine.on_workspace_recall().await,
                RecallKind::KeywordTrigger => engine.on_keyword_recall(query).await,
            }
        }
    }
}
