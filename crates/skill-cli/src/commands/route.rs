//! `skill route <query>` - run the query through the [`SemanticRouter`] and
//! print its decision.

use crate::app::App;
use colored::Colorize;

pub async fn run(app: &App, query: &str, json: bool) -> i32 {
    match app.router.route(query).await {
        Ok(result) => {
            if json {
                match serde_json::to_string_pretty(&result) {
                    Ok(text) => println!("{text}"),
                    Err(err) => {
                        eprintln!("{} serializing routing result: {err}", "error:".red().bold());
                        return 1;
                    }
                }
            } else if result.target_command == "clarify" {
                println!("{}", "clarify".yellow().bold());
                println!("{}", result.reasoning);
            } else {
                println!(
                    "{} {}.{} ({:.2} confidence{})",
                    "->".green().bold(),
                    result.target_skill,
                    result.target_command,
                    result.confidence,
                    if result.from_cache { ", cached" } else { "" },
                );
                println!("{}", result.task_brief);
            }
            0
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            crate::commands::exit_code_for_kind(err.kind())
        }
    }
}
