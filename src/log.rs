//! File logging for the agent connection.
//!
//! Nothing is written until [`init`] opens a log file, so library users that
//! never call it pay only for a mutex check per line.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use once_cell::sync::Lazy;
use chrono::Local;

static LOG_FILE: Lazy<Mutex<Option<File>>> = Lazy::new(|| Mutex::new(None));

const MAX_FRAME_DISPLAY: usize = 500;

/// Default log directory: `~/.copilot-sdk/logs`
pub fn default_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".copilot-sdk")
        .join("logs")
}

/// Initialize logging to a timestamped file inside `dir` (or [`default_dir`])
pub fn init(dir: Option<&Path>) -> std::io::Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let log_dir = dir.map(Path::to_path_buf).unwrap_or_else(default_dir);

    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(format!("copilot_{}.log", timestamp));

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)?;

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    log("=== copilot-sdk started ===");

    Ok(log_path)
}

/// Whether a log file is open
pub fn is_enabled() -> bool {
    LOG_FILE.lock().map(|guard| guard.is_some()).unwrap_or(false)
}

/// Log a message with timestamp
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = file.write_all(line.as_bytes());
            let _ = file.flush();
        }
    }
}

fn truncate_frame(frame: &str) -> String {
    if frame.len() <= MAX_FRAME_DISPLAY {
        return frame.to_string();
    }
    let mut end = MAX_FRAME_DISPLAY;
    while !frame.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &frame[..end], frame.len())
}

/// Log incoming frame (truncated for readability)
pub fn log_incoming(frame: &str) {
    log(&format!("<-- {}", truncate_frame(frame)));
}

/// Log outgoing frame
pub fn log_outgoing(frame: &str) {
    log(&format!("--> {}", truncate_frame(frame)));
}

/// Log an event
pub fn log_event(event: &str) {
    log(&format!("[EVENT] {}", event));
}

/// Log a line of agent stderr
pub fn log_agent_stderr(line: &str) {
    log(&format!("[AGENT] {}", line));
}
