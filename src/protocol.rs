//! Wire payloads for the agent session protocol
//!
//! Request params and results exchanged with the agent over JSON-RPC. Field
//! names are camelCase on the wire; absent optionals are omitted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::SessionEvent;

/// Protocol revision this crate speaks; checked against `ping` at startup
pub const SDK_PROTOCOL_VERSION: u32 = 2;

// ============================================================================
// Method names
// ============================================================================

pub mod methods {
    pub const PING: &str = "ping";
    pub const MODELS_LIST: &str = "models.list";
    pub const SESSION_CREATE: &str = "session.create";
    pub const SESSION_RESUME: &str = "session.resume";
    pub const SESSION_SEND: &str = "session.send";
    pub const SESSION_ABORT: &str = "session.abort";
    pub const SESSION_GET_MESSAGES: &str = "session.getMessages";
    pub const SESSION_DESTROY: &str = "session.destroy";
    pub const SESSION_LIST: &str = "session.list";
    pub const SESSION_DELETE: &str = "session.delete";
    pub const SESSION_GET_LAST_ID: &str = "session.getLastId";

    pub const SESSION_EVENT: &str = "session.event";
    pub const TOOL_CALL: &str = "tool.call";
    pub const PERMISSION_REQUEST: &str = "permission.request";
    pub const USER_INPUT_REQUEST: &str = "userInput.request";
}

// ============================================================================
// Ping / models
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub protocol_version: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capabilities: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListModelsResult {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

// ============================================================================
// Session configuration payloads
// ============================================================================

/// How the session's system message combines with the agent default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SystemMessage {
    Append { content: String },
    Replace { content: String },
}

impl SystemMessage {
    pub fn append(content: impl Into<String>) -> Self {
        SystemMessage::Append { content: content.into() }
    }

    pub fn replace(content: impl Into<String>) -> Self {
        SystemMessage::Replace { content: content.into() }
    }
}

fn all_tools() -> Vec<String> {
    vec!["*".to_string()]
}

/// MCP server providing tools to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    #[serde(alias = "stdio")]
    Local {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(default = "all_tools")]
        tools: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
        #[serde(default = "all_tools")]
        tools: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
        #[serde(default = "all_tools")]
        tools: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
}

impl McpServerConfig {
    /// Local (stdio) server exposing all of its tools
    pub fn local<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        McpServerConfig::Local {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            cwd: None,
            tools: all_tools(),
            timeout: None,
        }
    }

    /// Remote HTTP server exposing all of its tools
    pub fn http(url: impl Into<String>) -> Self {
        McpServerConfig::Http {
            url: url.into(),
            headers: BTreeMap::new(),
            tools: all_tools(),
            timeout: None,
        }
    }
}

/// Bring-your-own-key model provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire_api: Option<String>,
}

/// Tool as declared to the agent
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSessionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<SystemMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,
    pub request_permission: bool,
    pub request_user_input: bool,
    pub streaming: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResumeSessionParams {
    pub session_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,
    pub request_permission: bool,
    pub request_user_input: bool,
    pub streaming: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionCreatedResult {
    pub session_id: String,
    #[serde(default)]
    pub workspace_path: Option<String>,
}

// ============================================================================
// Messaging
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Attachment {
    File {
        path: String,
        #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    Directory {
        path: String,
        #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
}

impl Attachment {
    pub fn file(path: impl Into<String>) -> Self {
        Attachment::File { path: path.into(), display_name: None }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Attachment::Directory { path: path.into(), display_name: None }
    }
}

/// Delivery mode when the session is already busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    Enqueue,
    Immediate,
}

/// A user message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageOptions {
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SendMode>,
}

impl MessageOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachments: Vec::new(),
            mode: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_mode(mut self, mode: SendMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

impl From<&str> for MessageOptions {
    fn from(prompt: &str) -> Self {
        MessageOptions::new(prompt)
    }
}

impl From<String> for MessageOptions {
    fn from(prompt: String) -> Self {
        MessageOptions::new(prompt)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendParams<'a> {
    pub session_id: &'a str,
    #[serde(flatten)]
    pub message: &'a MessageOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendResult {
    pub message_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionIdParams<'a> {
    pub session_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetMessagesResult {
    #[serde(default)]
    pub events: Vec<SessionEvent>,
}

// ============================================================================
// Stored sessions
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub is_remote: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListSessionsResult {
    #[serde(default)]
    pub sessions: Vec<SessionMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteSessionResult {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LastSessionIdResult {
    #[serde(default)]
    pub session_id: Option<String>,
}

// ============================================================================
// Agent -> client requests
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionEventParams {
    pub session_id: String,
    pub event: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolCallParams {
    pub session_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PermissionRequestParams {
    pub session_id: String,
    pub permission_request: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserInputRequestParams {
    pub session_id: String,
    pub question: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub allow_freeform: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_message_wire_shape() {
        assert_eq!(
            serde_json::to_value(SystemMessage::append("Be brief.")).unwrap(),
            json!({"mode": "append", "content": "Be brief."})
        );
    }

    #[test]
    fn test_mcp_local_defaults_and_stdio_alias() {
        let cfg: McpServerConfig = serde_json::from_value(json!({
            "type": "stdio",
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-filesystem"]
        }))
        .unwrap();
        assert_eq!(
            cfg,
            McpServerConfig::local("npx", ["-y", "@modelcontextprotocol/server-filesystem"])
        );
        assert_eq!(
            serde_json::to_value(&cfg).unwrap(),
            json!({
                "type": "local",
                "command": "npx",
                "args": ["-y", "@modelcontextprotocol/server-filesystem"],
                "tools": ["*"]
            })
        );
    }

    #[test]
    fn test_send_params_flatten_message() {
        let message = MessageOptions::new("Summarize README.md")
            .with_attachment(Attachment::file("README.md"))
            .with_mode(SendMode::Enqueue);
        let params = SendParams { session_id: "s1", message: &message };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({
                "sessionId": "s1",
                "prompt": "Summarize README.md",
                "attachments": [{"type": "file", "path": "README.md"}],
                "mode": "enqueue"
            })
        );
    }

    #[test]
    fn test_create_params_omit_empty_fields() {
        let params = CreateSessionParams {
            session_id: None,
            model: Some("gpt-4.1".into()),
            tools: vec![],
            system_message: None,
            available_tools: None,
            excluded_tools: None,
            provider: None,
            request_permission: false,
            request_user_input: false,
            streaming: true,
            mcp_servers: BTreeMap::new(),
            working_directory: None,
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({
                "model": "gpt-4.1",
                "requestPermission": false,
                "requestUserInput": false,
                "streaming": true
            })
        );
    }

    #[test]
    fn test_session_metadata_parses_timestamps() {
        let meta: SessionMetadata = serde_json::from_value(json!({
            "sessionId": "abc",
            "startTime": "2025-01-02T03:04:05Z",
            "modifiedTime": "2025-01-02T04:00:00.123Z",
            "summary": "Refactor parser"
        }))
        .unwrap();
        assert_eq!(meta.session_id, "abc");
        assert!(meta.modified_time > meta.start_time);
        assert!(!meta.is_remote);
    }
}
