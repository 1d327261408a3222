//! `skill <skill>.<command> [args...]` - dispatch directly, bypassing the
//! router. `args` are `key=value` pairs folded into a single JSON object,
//! mirroring the teacher CLI's `parse_key_val` convention.

use crate::app::App;
use anyhow::{Context, Result};
use colored::Colorize;
use skill_kernel::DispatchOutcome;
use std::time::Duration;

/// Parse `key=value` pairs into a JSON object. A bare value with no `=` is
/// rejected rather than silently dropped (§4.F: invalid args surface as
/// exit code 3, not exit code 0 with partial work).
pub fn parse_args(pairs: &[String]) -> Result<serde_json::Value> {
    let mut map = serde_json::Map::with_capacity(pairs.len());
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("argument {pair:?} is not in key=value form"))?;
        let parsed = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        map.insert(key.to_string(), parsed);
    }
    Ok(serde_json::Value::Object(map))
}

pub async fn run(
    app: &App,
    skill_name: &str,
    command_name: &str,
    args: &[String],
    timeout_ms: Option<u64>,
    json: bool,
) -> i32 {
    let parsed_args = match parse_args(args) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return 3;
        }
    };

    let timeout = Duration::from_millis(timeout_ms.unwrap_or_else(|| app.config.default_timeout().as_millis() as u64));
    let pseudo_query = format!("{skill_name}.{command_name}");

    match app
        .dispatch
        .execute(&pseudo_query, skill_name, command_name, parsed_args, timeout)
        .await
    {
        DispatchOutcome::Ok { payload } => {
            if json {
                match serde_json::to_string_pretty(&payload) {
                    Ok(text) => println!("{text}"),
                    Err(err) => {
                        eprintln!("{} serializing payload: {err}", "error:".red().bold());
                        return 1;
                    }
                }
            } else {
                println!("{payload}");
            }
            0
        }
        DispatchOutcome::Error { kind, message } => {
            eprintln!("{} {message}", "error:".red().bold());
            crate::commands::exit_code_for_kind(&kind)
        }
    }
}
