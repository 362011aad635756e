//! Directory loader for microagent markdown files.
//!
//! Each `.md` file may open with a TOML front matter block between
//! `---` fences; the rest of the file is the microagent body:
//!
//! ```markdown
//! ---
//! name = "flarglebargle"
//! kind = "knowledge"
//! triggers = ["flarglebargle"]
//! ---
//! When the user says this magic word, remind them it means nothing.
//! ```
//!
//! A file without front matter is a repo microagent named after its
//! file stem. Individual files that fail to parse are skipped with a
//! warning; only a missing or unreadable directory fails the load.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{McpToolsConfig, Microagent, MicroagentKind, MicroagentOrigin};

/// Errors produced by microagent ingestion.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("microagent directory not found: {path}")]
    DirNotFound { path: String },

    #[error("failed to read microagent directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed microagent file {path}: {message}")]
    Parse { path: String, message: String },
}

/// Result type for ingestion operations.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Front matter fields recognized at the top of a microagent file.
#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    name: Option<String>,
    kind: Option<MicroagentKind>,
    triggers: Option<Vec<String>>,
    mcp_tools: Option<McpToolsConfig>,
}

/// Load all microagents from `dir`, returning `(repo, knowledge)` maps
/// keyed by microagent name.
///
/// The maps are `BTreeMap` so iteration order is deterministic and
/// stable for a fixed directory state; recall output ordering depends
/// on this. Task microagents are parsed and counted but not returned;
/// the recall engine never acts on them.
///
/// Fails with [`LoadError::DirNotFound`] when `dir` does not exist.
/// Callers that treat the directory as optional should map that case
/// to empty maps rather than propagating it.
pub fn load_microagents_from_dir(
    dir: &Path,
    origin: MicroagentOrigin,
) -> LoadResult<(BTreeMap<String, Microagent>, BTreeMap<String, Microagent>)> {
    if !dir.exists() {
        return Err(LoadError::DirNotFound {
            path: dir.display().to_string(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| LoadError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut repo = BTreeMap::new();
    let mut knowledge = BTreeMap::new();
    let mut skipped = 0usize;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        match load_microagent_file(&path, origin) {
            Ok(agent) => match agent.kind {
                MicroagentKind::Repo => {
                    repo.insert(agent.name.clone(), agent);
                }
                MicroagentKind::Knowledge => {
                    knowledge.insert(agent.name.clone(), agent);
                }
                // Task microagents are user-invoked, not recalled.
                MicroagentKind::Task => {}
            },
            Err(e) => {
                warn!(error = %e, "skipping malformed microagent file");
                skipped += 1;
            }
        }
    }

    debug!(
        dir = %dir.display(),
        repo = repo.len(),
        knowledge = knowledge.len(),
        skipped,
        "loaded microagents"
    );

    Ok((repo, knowledge))
}

/// Parse a single microagent file.
fn load_microagent_file(path: &Path, origin: MicroagentOrigin) -> LoadResult<Microagent> {
    let raw = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let (front, body) = split_front_matter(&raw);
    let front: FrontMatter = match front {
        Some(text) => toml::from_str(text).map_err(|e| LoadError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?,
        None => FrontMatter::default(),
    };

    let name = front.name.unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed")
            .to_string()
    });

    let triggers = front.triggers.unwrap_or_default();

    // Files that declare triggers default to knowledge; everything else
    // defaults to repo instructions.
    let kind = front.kind.unwrap_or(if triggers.is_empty() {
        MicroagentKind::Repo
    } else {
        MicroagentKind::Knowledge
    });

    if kind == MicroagentKind::Knowledge && triggers.is_empty() {
        return Err(LoadError::Parse {
            path: path.display().to_string(),
            message: "knowledge microagent declares no triggers".to_string(),
        });
    }

    if kind != MicroagentKind::Repo && front.mcp_tools.is_some() {
        return Err(LoadError::Parse {
            path: path.display().to_string(),
            message: format!("mcp_tools is only valid on repo microagents, found on {kind:?}"),
        });
    }

    Ok(Microagent {
        name,
        kind,
        content: body.trim().to_string(),
        origin,
        source: path.display().to_string(),
        triggers,
        mcp_tools: front.mcp_tools,
    })
}

/// Split a file into `(front matter, body)`.
///
/// Front matter is the text between an opening `---` on the first line
/// and the next `---` line. Returns `None` for files without it.
fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n")) else {
        return (None, raw);
    };
    // Immediately closed fence: empty front matter, body follows.
    if let Some(body) = rest.strip_prefix("---\n").or_else(|| rest.strip_prefix("---\r\n")) {
        return (Some(""), body);
    }
    if rest.trim_end() == "---" {
        return (Some(""), "");
    }
    match rest.split_once("\n---") {
        Some((front, tail)) => {
            // Drop the remainder of the fence line.
            let body = tail.split_once('\n').map(|(_, b)| b).unwrap_or("");
            (Some(front), body)
        }
        None => (None, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn missing_dir_is_not_found() {
        let err = load_microagents_from_dir(
            Path::new("/nonexistent/microagents"),
            MicroagentOrigin::Global,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::DirNotFound { .. }));
    }

    #[test]
    fn loads_repo_and_knowledge_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "repo.md",
            "---\nname = \"repo_agent\"\nkind = \"repo\"\n---\nAlways run the linter.\n",
        );
        write_file(
            dir.path(),
            "know.md",
            "---\nname = \"git_help\"\ntriggers = [\"git\", \"rebase\"]\n---\nUse git rebase -i.\n",
        );

        let (repo, knowledge) =
            load_microagents_from_dir(dir.path(), MicroagentOrigin::Global).unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo["repo_agent"].content, "Always run the linter.");
        assert_eq!(repo["repo_agent"].kind, MicroagentKind::Repo);

        assert_eq!(knowledge.len(), 1);
        let agent = &knowledge["git_help"];
        assert_eq!(agent.kind, MicroagentKind::Knowledge);
        assert_eq!(agent.triggers, vec!["git", "rebase"]);
        assert_eq!(agent.origin, MicroagentOrigin::Global);
    }

    #[test]
    fn file_without_front_matter_is_repo_named_after_stem() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "plain.md", "Just some instructions.\n");

        let (repo, knowledge) =
            load_microagents_from_dir(dir.path(), MicroagentOrigin::User).unwrap();

        assert!(knowledge.is_empty());
        assert_eq!(repo["plain"].content, "Just some instructions.");
        assert_eq!(repo["plain"].origin, MicroagentOrigin::User);
    }

    #[test]
    fn malformed_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "bad.md", "---\nthis is not toml ===\n---\nbody\n");
        write_file(dir.path(), "good.md", "Valid instructions.\n");

        let (repo, knowledge) =
            load_microagents_from_dir(dir.path(), MicroagentOrigin::Global).unwrap();

        assert_eq!(repo.len(), 1);
        assert!(repo.contains_key("good"));
        assert!(knowledge.is_empty());
    }

    #[test]
    fn empty_front_matter_block_leaves_no_fences_in_body() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "bare.md", "---\n---\nJust the body.\n");

        let (repo, knowledge) =
            load_microagents_from_dir(dir.path(), MicroagentOrigin::Global).unwrap();

        assert!(knowledge.is_empty());
        let agent = &repo["bare"];
        assert_eq!(agent.content, "Just the body.");
        assert!(!agent.content.contains("---"));
    }

    #[test]
    fn knowledge_without_triggers_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "kt.md",
            "---\nname = \"kt\"\nkind = \"knowledge\"\n---\nbody\n",
        );

        let (repo, knowledge) =
            load_microagents_from_dir(dir.path(), MicroagentOrigin::Global).unwrap();
        assert!(repo.is_empty());
        assert!(knowledge.is_empty());
    }

    #[test]
    fn mcp_tools_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "tools.md",
            concat!(
                "---\n",
                "name = \"mcp_agent\"\n",
                "kind = \"repo\"\n",
                "[[mcp_tools.stdio_servers]]\n",
                "name = \"fetcher\"\n",
                "command = \"uvx\"\n",
                "args = [\"mcp-fetch\"]\n",
                "---\n",
                "Repo instructions with tools.\n",
            ),
        );

        let (repo, _) = load_microagents_from_dir(dir.path(), MicroagentOrigin::Global).unwrap();
        let tools = repo["mcp_agent"].mcp_tools.as_ref().unwrap();
        assert_eq!(tools.stdio_servers.len(), 1);
        assert_eq!(tools.stdio_servers[0].command, "uvx");
    }

    #[test]
    fn task_files_and_non_markdown_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "task.md",
            "---\nname = \"task_agent\"\nkind = \"task\"\n---\nDo the thing.\n",
        );
        write_file(dir.path(), "notes.txt", "not a microagent");

        let (repo, knowledge) =
            load_microagents_from_dir(dir.path(), MicroagentOrigin::Global).unwrap();
        assert!(repo.is_empty());
        assert!(knowledge.is_empty());
    }
}
