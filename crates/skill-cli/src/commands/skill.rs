//! `skill skill list|load|unload|reload <name>` - direct registry
//! management, independent of routing or dispatch.

use crate::app::App;
use colored::Colorize;

pub async fn list(app: &App, loaded_only: bool) -> i32 {
    if loaded_only {
        for name in app.registry.list_loaded().await {
            println!("{name}");
        }
        return 0;
    }

    match app.registry.list_available() {
        Ok(names) => {
            for name in names {
                println!("{name}");
            }
            0
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            crate::commands::exit_code_for_kind(err.kind())
        }
    }
}

pub async fn load(app: &App, name: &str) -> i32 {
    match app.registry.load(name).await {
        Ok(skill) => {
            println!("{} loaded {} (v{})", "ok:".green().bold(), skill.name, skill.version);
            0
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            crate::commands::exit_code_for_kind(err.kind())
        }
    }
}

pub async fn unload(app: &App, name: &str) -> i32 {
    match app.registry.unload(name).await {
        Ok(()) => {
            println!("{} unloaded {name}", "ok:".green().bold());
            0
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            crate::commands::exit_code_for_kind(err.kind())
        }
    }
}

pub async fn reload(app: &App, name: &str) -> i32 {
    match app.registry.reload(name).await {
        Ok(skill) => {
            println!("{} reloaded {} (v{})", "ok:".green().bold(), skill.name, skill.version);
            0
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            crate::commands::exit_code_for_kind(err.kind())
        }
    }
}
