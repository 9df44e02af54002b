//! Reaching the agent: spawned over stdio, spawned over TCP, or external TCP

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use super::options::{ClientOptions, ConnectionMode};
use crate::error::{CopilotError, Result};
use crate::log;

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Byte stream to the agent plus the child process when we own one
pub(crate) struct Transport {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub child: Option<Child>,
}

pub(crate) async fn establish(options: &ClientOptions) -> Result<Transport> {
    match options.connection_mode()? {
        ConnectionMode::Stdio => spawn_stdio(options),
        ConnectionMode::SpawnTcp { port } => spawn_tcp(options, port).await,
        ConnectionMode::External { host, port } => {
            log::log_event(&format!("Connecting to agent at {}:{}", host, port));
            let (reader, writer) = connect_tcp(&host, port).await?;
            Ok(Transport {
                reader,
                writer,
                child: None,
            })
        }
    }
}

fn command(options: &ClientOptions, mode_args: &[String]) -> Command {
    let mut cmd = Command::new(options.resolved_cli_path());
    cmd.args(&options.cli_args)
        .arg("--server")
        .arg("--log-level")
        .arg(options.log_level.as_str())
        .args(mode_args)
        .envs(&options.env)
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    cmd
}

fn spawn(mut cmd: Command, options: &ClientOptions) -> Result<Child> {
    let path = options.resolved_cli_path();
    log::log_event(&format!("Spawning agent: {}", path.display()));
    cmd.spawn().map_err(|e| {
        CopilotError::ProcessSpawn(format!("failed to start '{}': {}", path.display(), e))
    })
}

fn spawn_stdio(options: &ClientOptions) -> Result<Transport> {
    let mut cmd = command(options, &["--stdio".to_string()]);
    cmd.stdin(Stdio::piped()).stdout(Stdio::piped());
    let mut child = spawn(cmd, options)?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| CopilotError::ProcessSpawn("agent stdin unavailable".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CopilotError::ProcessSpawn("agent stdout unavailable".into()))?;
    if let Some(stderr) = child.stderr.take() {
        forward_stderr(stderr);
    }

    Ok(Transport {
        reader: Box::new(stdout),
        writer: Box::new(stdin),
        child: Some(child),
    })
}

async fn spawn_tcp(options: &ClientOptions, port: u16) -> Result<Transport> {
    let mut cmd = command(options, &["--port".to_string(), port.to_string()]);
    cmd.stdin(Stdio::null()).stdout(Stdio::piped());
    let mut child = spawn(cmd, options)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CopilotError::ProcessSpawn("agent stdout unavailable".into()))?;
    if let Some(stderr) = child.stderr.take() {
        forward_stderr(stderr);
    }

    let port = wait_for_port(stdout, options.startup_timeout).await?;
    log::log_event(&format!("Agent listening on port {}", port));
    let (reader, writer) = connect_tcp("127.0.0.1", port).await?;
    Ok(Transport {
        reader,
        writer,
        child: Some(child),
    })
}

/// Read stdout until the agent announces its port; keep draining it afterwards
async fn wait_for_port(stdout: ChildStdout, timeout: Duration) -> Result<u16> {
    let mut lines = BufReader::new(stdout).lines();
    let port = tokio::time::timeout(timeout, scan_for_port(&mut lines))
        .await
        .map_err(|_| CopilotError::Timeout(timeout.as_millis() as u64))??;

    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            log::log_agent_stderr(&line);
        }
    });
    Ok(port)
}

async fn scan_for_port(lines: &mut Lines<BufReader<ChildStdout>>) -> Result<u16> {
    while let Some(line) = lines.next_line().await? {
        log::log_agent_stderr(&line);
        if let Some(port) = parse_listening_port(&line) {
            return Ok(port);
        }
    }
    Err(CopilotError::ProcessSpawn(
        "agent exited before announcing its port".into(),
    ))
}

fn parse_listening_port(line: &str) -> Option<u16> {
    const MARKER: &str = "listening on port";
    let lower = line.to_ascii_lowercase();
    let rest = &lower[lower.find(MARKER)? + MARKER.len()..];
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|port| *port > 0)
}

async fn connect_tcp(host: &str, port: u16) -> Result<(BoxedReader, BoxedWriter)> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    Ok((Box::new(reader), Box::new(writer)))
}

fn forward_stderr(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log::log_agent_stderr(&line);
        }
    });
}
