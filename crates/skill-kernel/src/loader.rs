//! Module Loader (§4.B): turns a skill directory into a populated [`Skill`].
//!
//! Grounded on the teacher's `skill_md.rs` (frontmatter + section parsing,
//! reused near-verbatim) and its directory-candidate-search idiom from the
//! dropped `local_loader.rs`. The teacher's hot-reload was "invalidate the
//! language's module cache"; here reload is explicit (§9): the loader
//! re-parses the directory into a fresh `Skill` with `version + 1` and only
//! returns it after validation succeeds, so a bad edit never displaces a
//! good one (fail-safe semantics).

use crate::errors::{KernelError, Result};
use crate::manifest::{CommandManifest, SkillManifestFile};
use crate::skill_md::{find_skill_md, parse_skill_md};
use crate::types::{ExecutionMode, Skill};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

/// A command's in-process callable, resolved by name at dispatch time.
/// Opaque to the rest of the core (§3: "the callable handle is opaque to
/// the core"); the embedding application registers these ahead of loading
/// any skill.
pub type DirectHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// The on-disk handler table the manifest is validated against (§9,
/// "explicit registration step ... validates the manifest against the
/// on-disk handler table").
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, HashMap<String, DirectHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, skill: impl Into<String>, command: impl Into<String>, handler: DirectHandler) {
        self.handlers
            .entry(skill.into())
            .or_default()
            .insert(command.into(), handler);
    }

    pub fn get(&self, skill: &str, command: &str) -> Option<&DirectHandler> {
        self.handlers.get(skill).and_then(|m| m.get(command))
    }

    fn known_commands(&self, skill: &str) -> HashSet<String> {
        self.handlers
            .get(skill)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Scans skill directories and produces/refreshes [`Skill`] values.
pub struct ModuleLoader {
    handlers: Arc<HandlerTable>,
}

impl ModuleLoader {
    pub fn new(handlers: Arc<HandlerTable>) -> Self {
        Self { handlers }
    }

    /// `load(dir) -> Skill` (§4.B). Scans `dir` for `skill.toml` (or
    /// `SKILL.md` frontmatter, which takes precedence if present since it's
    /// also the human-facing doc) plus `commands.toml`, validates for
    /// duplicate command names and missing handlers, and returns a
    /// populated `Skill`.
    pub fn load(&self, dir: &Path) -> Result<Skill> {
        self.load_versioned(dir, 1)
    }

    /// `reload(skill) -> Skill` (§4.B): re-parse the same directory at
    /// `version + 1`. The caller (Registry) only installs the result if
    /// this returns `Ok` — on `Err` the previous `Skill` is left untouched,
    /// satisfying fail-safe semantics.
    pub fn reload(&self, previous: &Skill) -> Result<Skill> {
        self.load_versioned(&previous.source_dir, previous.version + 1)
            .map_err(|e| KernelError::ReloadFailed {
                skill: previous.name.clone(),
                reason: e.to_string(),
            })
    }

    /// `unload(skill) -> void`: idempotent. The loader caches no per-skill
    /// state of its own (all state lives on the returned `Skill` and in the
    /// Registry's map), so unloading is a no-op at this layer; it exists as
    /// a named operation for symmetry with the spec and as the extension
    /// point for loaders that do cache (e.g. a compiled-artifact cache).
    pub fn unload(&self, _skill: &Skill) {}

    fn load_versioned(&self, dir: &Path, version: u64) -> Result<Skill> {
        if !dir.is_dir() {
            return Err(KernelError::LoadFailed {
                skill: dir.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        let skill_toml = dir.join("skill.toml");
        let skill_md_path = find_skill_md(dir);

        let (name, description, keywords, execution_mode, isolated_env) = if skill_toml.exists() {
            let manifest = SkillManifestFile::from_file(&skill_toml)?;
            (
                manifest.name,
                manifest.description,
                manifest.keywords,
                manifest.execution_mode,
                manifest.isolated_env,
            )
        } else if let Some(md_path) = &skill_md_path {
            let content = parse_skill_md(md_path).map_err(|e| KernelError::LoadFailed {
                skill: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            let fm = content.frontmatter;
            let keywords = fm
                .keywords
                .map(|k| k.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default();
            let mode = match fm.execution_mode.as_deref() {
                Some("subprocess") => ExecutionMode::Subprocess,
                _ => ExecutionMode::Direct,
            };
            (fm.name, fm.description, keywords, mode, fm.isolated_env)
        } else {
            return Err(KernelError::LoadFailed {
                skill: dir.display().to_string(),
                reason: "no skill.toml or SKILL.md found (empty manifest)".to_string(),
            });
        };

        if name.is_empty() {
            return Err(KernelError::LoadFailed {
                skill: dir.display().to_string(),
                reason: "manifest has no skill name".to_string(),
            });
        }

        let commands_toml = dir.join("commands.toml");
        if !commands_toml.exists() {
            return Err(KernelError::LoadFailed {
                skill: name.clone(),
                reason: "missing command handlers: no commands.toml".to_string(),
            });
        }
        let command_manifest = CommandManifest::from_file(&commands_toml)
            .map_err(|e| KernelError::LoadFailed { skill: name.clone(), reason: e.to_string() })?;
        command_manifest.validate_no_duplicates(&name)?;

        // Subprocess-mode commands are invoked by name on a child's command
        // line; they have no in-process handler to validate against.
        if execution_mode == ExecutionMode::Direct {
            let known_handlers = self.handlers.known_commands(&name);
            command_manifest.validate_against_handlers(&name, &known_handlers)?;
        }

        let commands = command_manifest
            .commands
            .into_iter()
            .map(|e| e.into_command())
            .collect();

        let (guide, routing_prompt) = match &skill_md_path {
            Some(p) => {
                let content = parse_skill_md(p).map_err(|e| KernelError::LoadFailed {
                    skill: name.clone(),
                    reason: e.to_string(),
                })?;
                (content.guide, content.routing_prompt)
            }
            None => (None, None),
        };

        let isolated_env_path = isolated_env.map(|rel| dir.join(rel));

        Ok(Skill {
            name,
            version,
            description,
            keywords,
            commands,
            guide,
            routing_prompt,
            execution_mode,
            isolated_env_path,
            source_dir: dir.to_path_buf(),
        })
    }

    /// The mtime the Registry polls to decide whether a reload is due
    /// (§4.C, "polls skill directories' modification times lazily").
    /// Returns the latest modification time among the manifest files that
    /// actually define a skill's behavior.
    pub fn directory_mtime(dir: &Path) -> Option<std::time::SystemTime> {
        let candidates = [dir.join("skill.toml"), dir.join("commands.toml"), dir.join("SKILL.md")];
        candidates
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok()?.modified().ok())
            .max()
    }

    pub fn resolve_handler(&self, skill: &str, command: &str) -> Option<&DirectHandler> {
        self.handlers.get(skill, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_skill(dir: &Path, subprocess: bool) {
        std::fs::write(
            dir.join("skill.toml"),
            format!(
                "name = \"git\"\nversion = 1\ndescription = \"git operations\"\nkeywords = [\"vcs\"]\nexecution_mode = \"{}\"\n",
                if subprocess { "subprocess" } else { "direct" }
            ),
        )
        .unwrap();
        let mut f = std::fs::File::create(dir.join("commands.toml")).unwrap();
        writeln!(
            f,
            "[[command]]\nname = \"commit\"\ndescription = \"commit staged changes\"\ncategory = \"write\"\n"
        )
        .unwrap();
    }

    fn noop_handler() -> DirectHandler {
        Arc::new(|_v| Box::pin(async { Ok(Value::Null) }))
    }

    #[test]
    fn load_succeeds_with_registered_handler() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), false);
        let mut table = HandlerTable::new();
        table.register("git", "commit", noop_handler());
        let loader = ModuleLoader::new(Arc::new(table));
        let skill = loader.load(tmp.path()).unwrap();
        assert_eq!(skill.name, "git");
        assert_eq!(skill.commands.len(), 1);
        assert_eq!(skill.version, 1);
    }

    #[test]
    fn load_fails_without_registered_handler() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), false);
        let loader = ModuleLoader::new(Arc::new(HandlerTable::new()));
        let err = loader.load(tmp.path()).unwrap_err();
        assert!(matches!(err, KernelError::LoadFailed { .. }));
    }

    #[test]
    fn reload_bumps_version() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), false);
        let mut table = HandlerTable::new();
        table.register("git", "commit", noop_handler());
        let loader = ModuleLoader::new(Arc::new(table));
        let first = loader.load(tmp.path()).unwrap();
        let second = loader.reload(&first).unwrap();
        assert_eq!(second.version, 2);
    }

    #[test]
    fn reload_failure_is_reported_without_mutating_caller() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), false);
        let mut table = HandlerTable::new();
        table.register("git", "commit", noop_handler());
        let loader = ModuleLoader::new(Arc::new(table));
        let first = loader.load(tmp.path()).unwrap();

        // Corrupt the commands manifest so the next reload fails validation.
        std::fs::write(tmp.path().join("commands.toml"), "not valid toml [[[").unwrap();
        let err = loader.reload(&first).unwrap_err();
        assert!(matches!(err, KernelError::ReloadFailed { .. }));
        // `first` is still the caller's good version; the loader never mutated it.
        assert_eq!(first.version, 1);
    }

    #[test]
    fn subprocess_mode_without_materialized_env_disables_direct() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), true);
        std::fs::write(
            tmp.path().join("skill.toml"),
            "name = \"crawl4ai\"\nversion = 1\ndescription = \"web crawler\"\nexecution_mode = \"subprocess\"\nisolated_env = \"venv\"\n",
        )
        .unwrap();
        let loader = ModuleLoader::new(Arc::new(HandlerTable::new()));
        let skill = loader.load(tmp.path()).unwrap();
        assert!(!skill.direct_mode_available());
    }
}
