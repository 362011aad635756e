//! Microagent listing assembly for administrative surfaces.
//!
//! Enumerates global and user microagents as lightweight metadata
//! records. Load failures degrade per origin: a broken or missing
//! origin contributes nothing, and both failing yields an empty list,
//! never an error.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::microagent::{load_microagents_from_dir, MicroagentKind, MicroagentOrigin};

/// Metadata about one available microagent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MicroagentInfo {
    pub name: String,
    pub kind: MicroagentKind,
    pub origin: MicroagentOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<String>>,
}

/// List all microagents from both origins, sorted by origin (global
/// before user) then name ascending.
pub fn list_microagents(global_dir: &Path, user_dir: &Path) -> Vec<MicroagentInfo> {
    let mut infos = Vec::new();
    collect_origin(global_dir, MicroagentOrigin::Global, &mut infos);
    collect_origin(user_dir, MicroagentOrigin::User, &mut infos);
    infos.sort_by(|a, b| a.origin.cmp(&b.origin).then_with(|| a.name.cmp(&b.name)));
    infos
}

fn collect_origin(dir: &Path, origin: MicroagentOrigin, out: &mut Vec<MicroagentInfo>) {
    let (repo, knowledge) = match load_microagents_from_dir(dir, origin) {
        Ok(maps) => maps,
        Err(e) => {
            warn!(error = %e, origin = origin.as_str(), "failed to list microagents");
            return;
        }
    };

    for agent in repo.values() {
        out.push(MicroagentInfo {
            name: agent.name.clone(),
            kind: agent.kind,
            origin,
            triggers: None,
        });
    }
    for agent in knowledge.values() {
        out.push(MicroagentInfo {
            name: agent.name.clone(),
            kind: agent.kind,
            origin,
            triggers: Some(agent.triggers.clone()),
        });
    }
}
