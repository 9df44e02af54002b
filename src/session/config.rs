//! Per-session configuration

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::permission::{PermissionHandler, UserInputHandler};
use crate::protocol::{
    CreateSessionParams, McpServerConfig, ProviderConfig, ResumeSessionParams, SystemMessage,
};
use crate::tools::{Tool, ToolRegistry};

/// Client-side pieces a live session needs to answer agent requests
#[derive(Clone, Default)]
pub(crate) struct SessionHandlers {
    pub tools: ToolRegistry,
    pub permission: Option<PermissionHandler>,
    pub user_input: Option<UserInputHandler>,
}

/// Configuration for `CopilotClient::create_session`
#[derive(Clone, Default)]
pub struct SessionConfig {
    /// Caller-chosen id; the agent generates one when absent
    pub session_id: Option<String>,
    pub model: Option<String>,
    /// Emit `assistant.message_delta` / `assistant.reasoning_delta` events
    pub streaming: bool,
    pub tools: Vec<Tool>,
    pub system_message: Option<SystemMessage>,
    /// Allow-list of built-in agent tools
    pub available_tools: Option<Vec<String>>,
    /// Deny-list of built-in agent tools
    pub excluded_tools: Option<Vec<String>>,
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    pub provider: Option<ProviderConfig>,
    pub working_directory: Option<PathBuf>,
    pub on_permission_request: Option<PermissionHandler>,
    pub on_user_input_request: Option<UserInputHandler>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_system_message(mut self, message: SystemMessage) -> Self {
        self.system_message = Some(message);
        self
    }

    pub fn with_mcp_server(mut self, name: impl Into<String>, server: McpServerConfig) -> Self {
        self.mcp_servers.insert(name.into(), server);
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_permission_handler(mut self, handler: PermissionHandler) -> Self {
        self.on_permission_request = Some(handler);
        self
    }

    pub fn with_user_input_handler(mut self, handler: UserInputHandler) -> Self {
        self.on_user_input_request = Some(handler);
        self
    }

    /// Split into wire params and local handlers; rejects duplicate tool names
    pub(crate) fn into_parts(self) -> Result<(CreateSessionParams, SessionHandlers)> {
        let tools = ToolRegistry::from_tools(self.tools)?;
        let params = CreateSessionParams {
            session_id: self.session_id,
            model: self.model,
            tools: tools.declarations(),
            system_message: self.system_message,
            available_tools: self.available_tools,
            excluded_tools: self.excluded_tools,
            provider: self.provider,
            request_permission: self.on_permission_request.is_some(),
            request_user_input: self.on_user_input_request.is_some(),
            streaming: self.streaming,
            mcp_servers: self.mcp_servers,
            working_directory: self
                .working_directory
                .map(|dir| dir.to_string_lossy().into_owned()),
        };
        let handlers = SessionHandlers {
            tools,
            permission: self.on_permission_request,
            user_input: self.on_user_input_request,
        };
        Ok((params, handlers))
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("session_id", &self.session_id)
            .field("model", &self.model)
            .field("streaming", &self.streaming)
            .field("tools", &self.tools)
            .field("system_message", &self.system_message)
            .field("mcp_servers", &self.mcp_servers)
            .field("working_directory", &self.working_directory)
            .field("on_permission_request", &self.on_permission_request.is_some())
            .field("on_user_input_request", &self.on_user_input_request.is_some())
            .finish_non_exhaustive()
    }
}

/// Configuration for `CopilotClient::resume_session`
#[derive(Clone, Default)]
pub struct ResumeSessionConfig {
    pub streaming: bool,
    pub tools: Vec<Tool>,
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    pub provider: Option<ProviderConfig>,
    pub on_permission_request: Option<PermissionHandler>,
    pub on_user_input_request: Option<UserInputHandler>,
}

impl ResumeSessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_mcp_server(mut self, name: impl Into<String>, server: McpServerConfig) -> Self {
        self.mcp_servers.insert(name.into(), server);
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_permission_handler(mut self, handler: PermissionHandler) -> Self {
        self.on_permission_request = Some(handler);
        self
    }

    pub fn with_user_input_handler(mut self, handler: UserInputHandler) -> Self {
        self.on_user_input_request = Some(handler);
        self
    }

    pub(crate) fn into_parts(self, session_id: &str) -> Result<(ResumeSessionParams, SessionHandlers)> {
        let tools = ToolRegistry::from_tools(self.tools)?;
        let params = ResumeSessionParams {
            session_id: session_id.to_string(),
            tools: tools.declarations(),
            provider: self.provider,
            request_permission: self.on_permission_request.is_some(),
            request_user_input: self.on_user_input_request.is_some(),
            streaming: self.streaming,
            mcp_servers: self.mcp_servers,
        };
        let handlers = SessionHandlers {
            tools,
            permission: self.on_permission_request,
            user_input: self.on_user_input_request,
        };
        Ok((params, handlers))
    }
}

/// Carry the reusable parts of a create config over to a resume
impl From<SessionConfig> for ResumeSessionConfig {
    fn from(config: SessionConfig) -> Self {
        Self {
            streaming: config.streaming,
            tools: config.tools,
            mcp_servers: config.mcp_servers,
            provider: config.provider,
            on_permission_request: config.on_permission_request,
            on_user_input_request: config.on_user_input_request,
        }
    }
}
