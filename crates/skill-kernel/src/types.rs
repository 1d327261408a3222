//! Core data model: the shared vocabulary every other module builds on.
//!
//! These types carry no behavior beyond small constructors/builders; the
//! modules that own them (Registry, Holographic Index, Router, ...) are
//! responsible for the state transitions the spec describes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a command's handle is invoked.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Invoke the handle in the current process.
    #[default]
    Direct,
    /// Delegate to the Subprocess Isolator.
    Subprocess,
}

/// Free-form command categorization; unknown values normalize to `General`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandCategory {
    Read,
    Write,
    Execute,
    Refactor,
    View,
    #[default]
    General,
}

impl CommandCategory {
    /// Normalize an arbitrary manifest string to a known category, falling
    /// back to `General` for anything unrecognized (§4.A).
    pub fn normalize(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "read" => Self::Read,
            "write" => Self::Write,
            "execute" => Self::Execute,
            "refactor" => Self::Refactor,
            "view" => Self::View,
            _ => Self::General,
        }
    }
}

/// One entry in a command's parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A callable operation belonging to a skill, identified as `"skill.command"`.
///
/// The handle itself is opaque to the core: for `Direct` mode it resolves
/// through the loader's handler table at dispatch time; for `Subprocess`
/// mode it is just the command name passed on the child's command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: CommandCategory,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl Command {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: CommandCategory::General,
            parameters: Vec::new(),
        }
    }

    /// Semantic text fed to the Holographic Index: description plus the
    /// names of all parameters, the shape `description ⊕ keywords ⊕
    /// parameter names` from §4.E (keywords come from the owning Skill).
    pub fn semantic_fragment(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {}", self.description, params)
    }
}

/// A directory-backed capability package.
///
/// Owned by the Registry; created at discovery, mutated only by reload,
/// destroyed on unload. `version` is a monotonically increasing counter,
/// per the redesign note in spec §9 ("Module reload via runtime cache
/// invalidation"): dispatch resolves `(skill, command, version)` so that
/// in-flight calls against the pre-reload version can finish untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub version: u64,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub commands: Vec<Command>,
    #[serde(default)]
    pub guide: Option<String>,
    #[serde(default)]
    pub routing_prompt: Option<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub isolated_env_path: Option<std::path::PathBuf>,
    /// Directory this skill was loaded from; needed by the Loader to detect
    /// mtime changes and by the Subprocess Isolator for the child's cwd.
    pub source_dir: std::path::PathBuf,
}

impl Skill {
    /// `true` if `direct` dispatch is available: the skill isn't declared
    /// subprocess-only, or its isolated environment already exists (§4.B
    /// edge case: "skill depending on an isolated environment that does not
    /// yet exist — load succeeds; execution in direct mode is disabled").
    pub fn direct_mode_available(&self) -> bool {
        match self.execution_mode {
            ExecutionMode::Direct => true,
            ExecutionMode::Subprocess => self
                .isolated_env_path
                .as_ref()
                .is_some_and(|p| p.exists()),
        }
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }
}

/// The index unit: the pair `(skill_name, command_name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEntry {
    pub skill_name: String,
    pub command_name: String,
    pub semantic_text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ToolEntry {
    pub fn id(&self) -> String {
        format!("{}.{}", self.skill_name, self.command_name)
    }

    pub fn from_skill_command(skill: &Skill, command: &Command) -> Self {
        let semantic_text = format!(
            "{} {} {}",
            command.semantic_fragment(),
            skill.keywords.join(" "),
            skill.description
        );
        let mut metadata = HashMap::new();
        metadata.insert("category".to_string(), format!("{:?}", command.category));
        Self {
            skill_name: skill.name.clone(),
            command_name: command.name.clone(),
            semantic_text,
            metadata,
        }
    }
}

/// Change kind emitted by the Registry's observer fanout (§4.C).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    // Ordinal order matters: debounce coalescing picks the *max* of this
    // enum within a window, encoding "unload > reload > load" (§4.C).
    Load,
    Reload,
    Unload,
}

/// One coalesced notification delivered to Registry observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillChangeEvent {
    pub skill_name: String,
    pub change_type: ChangeType,
}

/// Result of the Router's `route()` operation; ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingResult {
    pub target_skill: String,
    pub target_command: String,
    pub task_brief: String,
    pub confidence: f32,
    pub reasoning: String,
    pub from_cache: bool,
    pub env_snapshot: EnvironmentSnapshot,
    #[serde(default)]
    pub lesson_refs: Vec<String>,
}

impl RoutingResult {
    /// The sentinel result when no candidate clears the confidence floor
    /// (§4.J step 6): `target_command = "clarify"` regardless of the
    /// candidate, no Dispatch performed.
    pub fn clarify(reasoning: impl Into<String>, env_snapshot: EnvironmentSnapshot) -> Self {
        Self {
            target_skill: String::new(),
            target_command: "clarify".to_string(),
            task_brief: "Ask the user to clarify their request.".to_string(),
            confidence: 0.0,
            reasoning: reasoning.into(),
            from_cache: false,
            env_snapshot,
            lesson_refs: Vec::new(),
        }
    }

    pub fn needs_clarification(&self) -> bool {
        self.target_command == "clarify"
    }
}

/// A live snapshot of the working environment; never cached across calls,
/// never persisted (§4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub git_branch: Option<String>,
    pub git_modified_count: usize,
    pub git_staged_count: usize,
    /// First N (N=3) unique modified paths in lexical order, plus a
    /// "+K more" marker rendered by `to_prompt_string`.
    pub dirty_files: Vec<String>,
    pub dirty_files_total: usize,
    pub active_context_lines: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EnvironmentSnapshot {
    /// A stable textual form suitable for inclusion in a model prompt.
    pub fn to_prompt_string(&self) -> String {
        let branch = self.git_branch.as_deref().unwrap_or("(no branch)");
        let mut preview = self.dirty_files.join(", ");
        let remaining = self.dirty_files_total.saturating_sub(self.dirty_files.len());
        if remaining > 0 {
            if !preview.is_empty() {
                preview.push_str(", ");
            }
            preview.push_str(&format!("+{remaining} more"));
        }
        if preview.is_empty() {
            preview.push_str("(clean)");
        }
        format!(
            "branch={branch} staged={staged} modified={modified} dirty=[{preview}] scratchpad_lines={lines} at={ts}",
            staged = self.git_staged_count,
            modified = self.git_modified_count,
            lines = self.active_context_lines,
            ts = self.timestamp.to_rfc3339(),
        )
    }
}

/// Envelope returned by `Dispatch.execute` (§4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DispatchOutcome {
    Ok { payload: serde_json::Value },
    Error { kind: String, message: String },
}

impl DispatchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, DispatchOutcome::Ok { .. })
    }
}
