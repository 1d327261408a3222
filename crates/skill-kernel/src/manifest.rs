//! Explicit command manifest: the systems-language replacement for the
//! decorator-registered commands of the source system (§9).
//!
//! Rather than running a skill's code at import time to discover which
//! functions were tagged `@SkillCommand`, each skill directory ships a
//! `commands.toml` enumerating its commands up front. The [`crate::loader::ModuleLoader`]
//! validates that manifest against an on-disk handler table supplied by the
//! embedding application — this keeps command discovery static and
//! side-effect free (§4.A).

use crate::errors::{KernelError, Result};
use crate::types::{Command, CommandCategory, ExecutionMode, ParameterSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One `[[command]]` table in `commands.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandManifestEntry {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl CommandManifestEntry {
    pub fn into_command(self) -> Command {
        Command {
            name: self.name,
            description: self.description,
            category: CommandCategory::normalize(&self.category),
            parameters: self.parameters,
        }
    }
}

/// The parsed contents of `commands.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandManifest {
    #[serde(default, rename = "command")]
    pub commands: Vec<CommandManifestEntry>,
}

impl CommandManifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let manifest: CommandManifest = toml::from_str(&raw)?;
        Ok(manifest)
    }

    /// Reject ambiguous duplicate command names within one skill (§4.A).
    pub fn validate_no_duplicates(&self, skill_name: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.commands {
            if !seen.insert(entry.name.clone()) {
                return Err(KernelError::Duplicate {
                    skill: skill_name.to_string(),
                    command: entry.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validate every manifest-declared command has a corresponding handler
    /// in the on-disk table the embedding application registered ahead of
    /// time. A command with no handler is the static analogue of "handler
    /// raising at import time" (§4.B edge case), surfaced as `LoadFailed`.
    pub fn validate_against_handlers(
        &self,
        skill_name: &str,
        known_handlers: &HashSet<String>,
    ) -> Result<()> {
        for entry in &self.commands {
            if !known_handlers.contains(&entry.name) {
                return Err(KernelError::LoadFailed {
                    skill: skill_name.to_string(),
                    reason: format!("no registered handler for command {:?}", entry.name),
                });
            }
        }
        Ok(())
    }
}

/// `skill.toml`: the top-level per-skill descriptor sitting alongside (or
/// merged into) `SKILL.md`'s frontmatter. Separated from `CommandManifest`
/// because a skill's routing metadata and its command list change at
/// different rates and are owned by different authors in practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillManifestFile {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u64,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub isolated_env: Option<String>,
}

fn default_version() -> u64 {
    1
}

impl SkillManifestFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let manifest: SkillManifestFile = toml::from_str(&raw)?;
        Ok(manifest)
    }
}
