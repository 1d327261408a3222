//! `skill index reconcile` - bring the Holographic Index in line with the
//! skills actually on disk: load any skill not yet in the registry, then
//! diff the registry's commands against the index (§4.E).

use crate::app::App;
use colored::Colorize;
use skill_kernel::ToolEntry;

pub async fn reconcile(app: &App) -> i32 {
    let names = match app.registry.list_available() {
        Ok(names) => names,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return crate::commands::exit_code_for_kind(err.kind());
        }
    };

    for name in &names {
        if app.registry.get(name).await.is_none() {
            if let Err(err) = app.registry.load(name).await {
                eprintln!("{} skipping {name}: {err}", "warn:".yellow().bold());
            }
        }
    }

    let mut live_entries = Vec::new();
    for name in app.registry.list_loaded().await {
        let Some(skill) = app.registry.get(&name).await else { continue };
        for command in &skill.commands {
            live_entries.push(ToolEntry::from_skill_command(&skill, command));
        }
    }

    match app.index.reconcile(&live_entries).await {
        Ok(report) => {
            println!(
                "{} removed={} reindexed={}",
                "ok:".green().bold(),
                report.removed,
                report.reindexed
            );
            0
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            crate::commands::exit_code_for_kind(err.kind())
        }
    }
}
