//! In-memory microagent registry.
//!
//! Holds the repo and knowledge microagent maps for one session.
//! Populated once from the two well-known source directories (global
//! and user); read-only from the recall engine's perspective apart
//! from the administrative replace methods.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::microagent::{load_microagents_from_dir, LoadError, Microagent, MicroagentOrigin};

/// Registry of loaded microagents, keyed by name.
///
/// Backed by `BTreeMap` so iteration order is deterministic; recall
/// results concatenate and match in this order.
#[derive(Debug, Default)]
pub struct MicroagentRegistry {
    repo: BTreeMap<String, Microagent>,
    knowledge: BTreeMap<String, Microagent>,
}

impl MicroagentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load microagents from the global and user source directories.
    ///
    /// Both directories are optional: a missing or unreadable directory
    /// contributes zero microagents and a warning, never an error. User
    /// microagents shadow global ones with the same name.
    pub fn load(global_dir: &Path, user_dir: &Path) -> Self {
        let mut registry = Self::new();
        registry.merge_dir(global_dir, MicroagentOrigin::Global);
        registry.merge_dir(user_dir, MicroagentOrigin::User);
        info!(
            repo = registry.repo.len(),
            knowledge = registry.knowledge.len(),
            "microagent registry loaded"
        );
        registry
    }

    fn merge_dir(&mut self, dir: &Path, origin: MicroagentOrigin) {
        match load_microagents_from_dir(dir, origin) {
            Ok((repo, knowledge)) => {
                self.repo.extend(repo);
                self.knowledge.extend(knowledge);
            }
            Err(LoadError::DirNotFound { path }) => {
                warn!(%path, origin = origin.as_str(), "microagent directory absent, skipping");
            }
            Err(e) => {
                warn!(error = %e, origin = origin.as_str(), "failed to load microagents");
            }
        }
    }

    /// Repo microagents in stable name order.
    pub fn repo_microagents(&self) -> impl Iterator<Item = &Microagent> {
        self.repo.values()
    }

    /// Knowledge microagents in stable name order.
    pub fn knowledge_microagents(&self) -> impl Iterator<Item = &Microagent> {
        self.knowledge.values()
    }

    pub fn is_empty(&self) -> bool {
        self.repo.is_empty() && self.knowledge.is_empty()
    }

    /// Administrative overwrite of the repo map (tests, hot reload).
    pub fn replace_repo(&mut self, repo: BTreeMap<String, Microagent>) {
        self.repo = repo;
    }

    /// Administrative overwrite of the knowledge map (tests, hot reload).
    pub fn replace_knowledge(&mut self, knowledge: BTreeMap<String, Microagent>) {
        self.knowledge = knowledge;
    }
}
