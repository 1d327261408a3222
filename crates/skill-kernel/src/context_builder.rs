//! Context Builder (§4.D): assembles a Skill's prompt-injection context.
//!
//! Grounded on the teacher's `skill_md.rs` section-extraction style (build a
//! formatted blob from named sections) — here applied in reverse, composing
//! a blob *from* the already-parsed `Skill` rather than parsing one out of
//! markdown. No side effects; pure formatting.

use crate::types::Skill;
use std::fmt::Write as _;

/// A single serialized "skill context" blob: manifest description, ordered
/// command list with signatures, guide text, routing prompt, and a
/// canonical help section — one line per command (§4.D).
pub fn build_skill_context(skill: &Skill) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## {} (v{})", skill.name, skill.version);
    let _ = writeln!(out, "{}", skill.description);
    if !skill.keywords.is_empty() {
        let _ = writeln!(out, "keywords: {}", skill.keywords.join(", "));
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "### Commands");
    for command in &skill.commands {
        let _ = writeln!(out, "{}", command_signature(skill, command));
    }
    let _ = writeln!(out);

    if let Some(guide) = &skill.guide {
        let _ = writeln!(out, "### Guide\n{guide}\n");
    }
    if let Some(prompt) = &skill.routing_prompt {
        let _ = writeln!(out, "### Routing Prompt\n{prompt}\n");
    }

    let _ = writeln!(out, "### Help");
    for command in &skill.commands {
        let _ = writeln!(out, "{}", help_line(skill, command));
    }

    out
}

fn command_signature(skill: &Skill, command: &crate::types::Command) -> String {
    let params = command
        .parameters
        .iter()
        .map(|p| {
            if p.required {
                format!("{}: {}", p.name, p.param_type)
            } else {
                format!("[{}: {}]", p.name, p.param_type)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("- `{}.{}`({}) — {}", skill.name, command.name, params, command.description)
}

fn help_line(skill: &Skill, command: &crate::types::Command) -> String {
    format!("{}.{}: {}", skill.name, command.name, command.description)
}

/// Build a compact menu across every loaded skill, the shape the Semantic
/// Router assembles alongside retrieved lessons and the environment
/// snapshot before calling `Inference.complete` (§4.J step 1).
pub fn build_menu(skills: &[Skill]) -> String {
    let mut out = String::new();
    for skill in skills {
        let _ = writeln!(out, "{} — {}", skill.name, skill.description);
        for command in &skill.commands {
            let _ = writeln!(out, "  {}", help_line(skill, command));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Command, ExecutionMode};

    fn sample_skill() -> Skill {
        Skill {
            name: "git".to_string(),
            version: 3,
            description: "version control operations".to_string(),
            keywords: vec!["vcs".to_string(), "commit".to_string()],
            commands: vec![Command::new("commit", "commit staged changes")],
            guide: Some("Always check `git status` first.".to_string()),
            routing_prompt: Some("Prefer this skill for anything repo-related.".to_string()),
            execution_mode: ExecutionMode::Direct,
            isolated_env_path: None,
            source_dir: std::path::PathBuf::from("/skills/git"),
        }
    }

    #[test]
    fn context_blob_contains_every_section() {
        let blob = build_skill_context(&sample_skill());
        assert!(blob.contains("git (v3)"));
        assert!(blob.contains("git.commit"));
        assert!(blob.contains("Always check"));
        assert!(blob.contains("Prefer this skill"));
        assert!(blob.contains("### Help"));
    }

    #[test]
    fn menu_covers_all_commands_across_skills() {
        let skills = vec![sample_skill()];
        let menu = build_menu(&skills);
        assert!(menu.contains("git — version control operations"));
        assert!(menu.contains("git.commit: commit staged changes"));
    }
}
