//! Client SDK for Copilot CLI agents in server mode.
//!
//! A [`CopilotClient`] spawns (or connects to) the agent and speaks JSON-RPC 2.0
//! with `Content-Length` framing. Each [`CopilotSession`] is one conversation:
//! send prompts, consume the ordered event stream, and answer the agent's tool,
//! permission and user-input requests.
//!
//! ```no_run
//! use copilot_sdk::{ClientOptions, CopilotClient, SessionConfig};
//!
//! # async fn demo() -> copilot_sdk::Result<()> {
//! let client = CopilotClient::new(ClientOptions::default());
//! client.start().await?;
//!
//! let session = client
//!     .create_session(SessionConfig::new().with_model("gpt-4.1"))
//!     .await?;
//! if let Some(reply) = session.send_and_wait("What is 2 + 2?", None).await? {
//!     println!("{}", reply.assistant_message_content().unwrap_or_default());
//! }
//!
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod jsonrpc;
pub mod log;
pub mod permission;
pub mod protocol;
pub mod session;
pub mod tools;

#[cfg(test)]
mod testing;

pub use client::{ClientOptions, ConnectionState, CopilotClient, LogLevel};
pub use config::Config;
pub use error::{CopilotError, Result};
pub use events::{SessionEvent, SessionEventData};
pub use permission::{
    approve_all, permission_handler, user_input_handler, PermissionHandler, PermissionKind,
    PermissionRequest, PermissionResult, UserInputHandler, UserInputRequest, UserInputResponse,
};
pub use protocol::{
    Attachment, MessageOptions, McpServerConfig, ModelInfo, ProviderConfig, SendMode,
    SessionMetadata, SystemMessage, SDK_PROTOCOL_VERSION,
};
pub use session::{
    CopilotSession, EventStream, ResumeSessionConfig, SessionConfig, SessionState, Subscription,
};
pub use tools::{Tool, ToolInvocation, ToolRegistry, ToolResult, ToolResultType};
