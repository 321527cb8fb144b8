//! Interactive chat loop. One session lives for the life of the process;
//! `:`-prefixed lines reach the non-conversational edit entrypoints.

use std::collections::BTreeMap;

use anyhow::Result;
use intentcad_core::{Engine, ParamValue};
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(engine: &Engine) -> Result<()> {
    let session_id = engine.start_session();
    println!("intentcad session {session_id}");
    println!("type a description of what to build, or ':help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        use std::io::Write;
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" || line == ":exit" {
            break;
        }

        if let Some(rest) = line.strip_prefix(':') {
            if let Err(err) = handle_command(engine, &session_id, rest).await {
                println!("error: {err}");
            }
            continue;
        }

        match engine.submit_turn(&session_id, line, None, None).await {
            Ok(outcome) => {
                println!("{}", outcome.response_text);
                if outcome.requires_clarification {
                    for question in &outcome.clarification_questions {
                        println!("  - {question}");
                    }
                }
            }
            Err(err) => println!("error: {err}"),
        }
    }

    engine.close_session(&session_id).ok();
    Ok(())
}

async fn handle_command(engine: &Engine, session_id: &str, command: &str) -> Result<()> {
    let mut parts = command.splitn(2, ' ');
    let name = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match name {
        "help" => {
            println!(":params                   list parameters");
            println!(":ops                       list operations");
            println!(":set <name> <value>        directly update a parameter");
            println!(":checkpoint [description]  snapshot the current model");
            println!(":rollback <checkpoint_id>  restore a prior snapshot");
            println!(":history                   list edit history entries");
            println!(":quit                      exit");
        }
        "params" => {
            for param in engine.get_parameters(session_id).await? {
                println!("{} = {}", param.name, param.value);
            }
        }
        "ops" => {
            for op in engine.get_operations(session_id).await? {
                println!("{} ({})", op.name, op.kind);
            }
        }
        "set" => {
            let mut fields = rest.splitn(2, ' ');
            let (Some(name), Some(value)) = (fields.next(), fields.next()) else {
                println!("usage: :set <name> <value>");
                return Ok(());
            };
            let value: f64 = value
                .parse()
                .map_err(|_| anyhow::anyhow!("'{value}' is not a number"))?;
            let affected = engine
                .update_parameter(session_id, name, ParamValue::Numeric(value))
                .await?;
            println!("updated {name}; {} operation(s) affected", affected.len());
        }
        "checkpoint" => {
            let description = if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            };
            let id = engine.checkpoint(session_id, description).await?;
            println!("checkpoint {id}");
        }
        "rollback" => {
            if rest.is_empty() {
                println!("usage: :rollback <checkpoint_id>");
                return Ok(());
            }
            engine.rollback(session_id, rest, true).await?;
            println!("rolled back to {rest}");
        }
        "history" => {
            for entry in engine.edit_history(session_id).await? {
                println!("{} - {}", entry.id, entry.description);
            }
        }
        "validate" => {
            let params: BTreeMap<String, ParamValue> = BTreeMap::new();
            let script = if rest.is_empty() { None } else { Some(rest) };
            let report = engine.validate_edit(session_id, script, &params).await?;
            println!("valid: {}", report.is_valid);
            for error in &report.errors {
                println!("  error: {error}");
            }
        }
        other => println!("unknown command ':{other}' — try :help"),
    }

    Ok(())
}
