use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use copilot_sdk::log;
use copilot_sdk::{
    permission_handler, Config, CopilotClient, CopilotSession, PermissionKind, PermissionResult,
    ResumeSessionConfig, SessionConfig, SessionEventData, Subscription, Tool, ToolResult,
};

const USAGE: &str = "\
Usage: copilot-sdk [OPTIONS] [PROMPT...]

Options:
  -m, --model <MODEL>     Model for the new session
      --cli-url <URL>     Connect to a running agent instead of spawning one
      --cli-path <PATH>   Agent executable
  -r, --resume <ID>       Continue a stored session
  -l, --list              List stored sessions and exit
      --no-stream         Print whole replies instead of streaming
      --allow-all         Approve every permission request
  -h, --help              Show this help

Without a prompt, reads prompts from stdin until EOF or /quit.";

#[derive(Debug, Default)]
struct Args {
    model: Option<String>,
    cli_url: Option<String>,
    cli_path: Option<PathBuf>,
    resume: Option<String>,
    list: bool,
    no_stream: bool,
    allow_all: bool,
    prompt: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Option<Args>> {
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let value = |name: &str| {
            args.get(i + 1)
                .cloned()
                .with_context(|| format!("{} requires an argument", name))
        };
        match args[i].as_str() {
            "--model" | "-m" => {
                parsed.model = Some(value("--model")?);
                i += 1;
            }
            "--cli-url" => {
                parsed.cli_url = Some(value("--cli-url")?);
                i += 1;
            }
            "--cli-path" => {
                parsed.cli_path = Some(PathBuf::from(value("--cli-path")?));
                i += 1;
            }
            "--resume" | "-r" => {
                parsed.resume = Some(value("--resume")?);
                i += 1;
            }
            "--list" | "-l" => parsed.list = true,
            "--no-stream" => parsed.no_stream = true,
            "--allow-all" => parsed.allow_all = true,
            "--help" | "-h" => return Ok(None),
            "--" => {
                parsed.prompt.extend(args[i + 1..].iter().cloned());
                break;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Warning: ignoring unknown option '{}'", arg);
            }
            arg => parsed.prompt.push(arg.to_string()),
        }
        i += 1;
    }

    Ok(Some(parsed))
}

fn current_time_tool() -> Tool {
    Tool::new("current_time", |_invocation| async {
        let now = Local::now();
        anyhow::Ok(ToolResult::text(now.format("%Y-%m-%d %H:%M:%S %Z").to_string()))
    })
    .with_description("Get the current local date and time")
    .with_parameters(json!({"type": "object", "properties": {}}))
}

fn session_config(config: &Config, args: &Args) -> SessionConfig {
    let allow_all = args.allow_all;
    let mut session = config
        .session_config()
        .with_tool(current_time_tool())
        .with_permission_handler(permission_handler(move |request, _invocation| async move {
            let approved = allow_all || request.kind == PermissionKind::Read;
            log::log_event(&format!("Permission {:?}: approved={}", request.kind, approved));
            anyhow::Ok(if approved {
                PermissionResult::Approved
            } else {
                PermissionResult::DeniedInteractivelyByUser {
                    feedback: Some("Re-run with --allow-all to permit this".to_string()),
                }
            })
        }));
    if args.no_stream {
        session = session.with_streaming(false);
    }
    session
}

/// Print deltas as they arrive; tool activity goes to stderr
fn print_stream(session: &CopilotSession) -> Subscription {
    session.on(|event| match &event.data {
        SessionEventData::AssistantMessageDelta(delta) => {
            print!("{}", delta.delta_content);
            let _ = std::io::stdout().flush();
        }
        SessionEventData::ToolExecutionStart(start) => {
            eprintln!("\n[tool] {}", start.tool_name);
        }
        SessionEventData::SessionIdle => println!(),
        _ => {}
    })
}

async fn ask(session: &CopilotSession, prompt: &str, streaming: bool) -> Result<()> {
    let reply = tokio::select! {
        reply = session.send_and_wait(prompt, None) => reply?,
        _ = tokio::signal::ctrl_c() => {
            session.abort().await?;
            eprintln!("\n[aborted]");
            return Ok(());
        }
    };

    if !streaming {
        match reply.as_ref().and_then(|event| event.assistant_message_content()) {
            Some(content) => println!("{}", content),
            None => eprintln!("[no reply]"),
        }
    }
    Ok(())
}

async fn repl(session: &CopilotSession, streaming: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        match prompt {
            "" => continue,
            "/quit" | "/exit" => break,
            _ => {
                if let Err(e) = ask(session, prompt, streaming).await {
                    eprintln!("Error: {}", e);
                }
            }
        }
    }
    Ok(())
}

async fn list_sessions(client: &CopilotClient) -> Result<()> {
    let sessions = client.list_sessions().await?;
    if sessions.is_empty() {
        println!("No stored sessions");
        return Ok(());
    }
    for session in sessions {
        println!(
            "{}  {}  {}",
            session.session_id,
            session.modified_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            session.summary.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn run(client: &CopilotClient, config: &Config, args: &Args) -> Result<()> {
    client.start().await.context("Failed to start agent")?;

    if args.list {
        return list_sessions(client).await;
    }

    let session_config = session_config(config, args);
    let streaming = session_config.streaming;
    let session = match &args.resume {
        Some(id) => client
            .resume_session(id, ResumeSessionConfig::from(session_config))
            .await
            .with_context(|| format!("Failed to resume session {}", id))?,
        None => client.create_session(session_config).await?,
    };
    eprintln!("Session {}", session.id());

    let _printer = streaming.then(|| print_stream(&session));

    if args.prompt.is_empty() {
        repl(&session, streaming).await
    } else {
        ask(&session, &args.prompt.join(" "), streaming).await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<String> = std::env::args().collect();
    let Some(args) = parse_args(&argv)? else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()
        .with_env()
        .with_overrides(args.cli_path.clone(), args.cli_url.clone(), args.model.clone());

    if let Ok(log_path) = log::init(Some(&config.log_dir())) {
        log::log(&format!("Log file: {}", log_path.display()));
    }

    let client = CopilotClient::new(config.client_options());
    let result = run(&client, &config, &args).await;

    if let Err(e) = client.stop().await {
        eprintln!("Warning: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("copilot-sdk")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_flags_and_prompt() {
        let args = parse_args(&argv(&["-m", "gpt-4.1", "--no-stream", "what", "time?"]))
            .unwrap()
            .unwrap();
        assert_eq!(args.model.as_deref(), Some("gpt-4.1"));
        assert!(args.no_stream);
        assert_eq!(args.prompt, vec!["what", "time?"]);
    }

    #[test]
    fn test_parse_missing_value_is_error() {
        assert!(parse_args(&argv(&["--resume"])).is_err());
    }

    #[test]
    fn test_help_returns_none() {
        assert!(parse_args(&argv(&["--list", "-h"])).unwrap().is_none());
    }

    #[test]
    fn test_double_dash_keeps_rest_as_prompt() {
        let args = parse_args(&argv(&["--", "--list", "me"])).unwrap().unwrap();
        assert!(!args.list);
        assert_eq!(args.prompt, vec!["--list", "me"]);
    }

    #[tokio::test]
    async fn test_current_time_tool_succeeds() {
        let tool = current_time_tool();
        let result = tool
            .call(copilot_sdk::ToolInvocation {
                session_id: "s".into(),
                tool_call_id: "t".into(),
                tool_name: "current_time".into(),
                arguments: json!({}),
            })
            .await;
        assert!(result.is_success());
    }
}
