//! Permission and user-input handling
//!
//! Centralizes how a session answers `permission.request` and
//! `userInput.request` calls from the agent.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::log;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Shell,
    Write,
    Mcp,
    Read,
    Url,
    #[serde(other)]
    Unknown,
}

/// What the agent wants to do; kind-specific fields stay in `details`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub kind: PermissionKind,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PermissionResult {
    Approved,
    DeniedByRules {
        rules: Vec<Value>,
    },
    #[serde(rename = "denied-no-approval-rule-and-could-not-request-from-user")]
    DeniedNoApprovalRule,
    DeniedInteractivelyByUser {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
}

impl PermissionResult {
    pub fn is_approved(&self) -> bool {
        matches!(self, PermissionResult::Approved)
    }
}

/// Context passed alongside a permission request
#[derive(Debug, Clone)]
pub struct PermissionInvocation {
    pub session_id: String,
}

pub type PermissionHandler = Arc<
    dyn Fn(PermissionRequest, PermissionInvocation) -> BoxFuture<'static, anyhow::Result<PermissionResult>>
        + Send
        + Sync,
>;

/// Wrap an async closure as a [`PermissionHandler`]
pub fn permission_handler<F, Fut>(handler: F) -> PermissionHandler
where
    F: Fn(PermissionRequest, PermissionInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<PermissionResult>> + Send + 'static,
{
    Arc::new(move |request, invocation| handler(request, invocation).boxed())
}

/// Handler that approves every request
pub fn approve_all() -> PermissionHandler {
    permission_handler(|_request, _invocation| async { anyhow::Ok(PermissionResult::Approved) })
}

/// Resolve a raw `permissionRequest` payload.
///
/// No handler, an unparseable request, or a failing handler all deny.
pub async fn resolve_permission(
    handler: Option<&PermissionHandler>,
    request: Value,
    invocation: PermissionInvocation,
) -> PermissionResult {
    let Some(handler) = handler else {
        return PermissionResult::DeniedNoApprovalRule;
    };

    let request: PermissionRequest = match serde_json::from_value(request) {
        Ok(request) => request,
        Err(e) => {
            log::log_event(&format!("Unparseable permission request: {}", e));
            return PermissionResult::DeniedNoApprovalRule;
        }
    };

    log::log_event(&format!(
        "Permission request: {:?} (tool call {:?})",
        request.kind, request.tool_call_id
    ));

    match handler(request, invocation).await {
        Ok(result) => result,
        Err(e) => {
            log::log_event(&format!("Permission handler failed: {}", e));
            PermissionResult::DeniedNoApprovalRule
        }
    }
}

// ============================================================================
// User input
// ============================================================================

/// Question the agent wants the user to answer
#[derive(Debug, Clone)]
pub struct UserInputRequest {
    pub session_id: String,
    pub question: String,
    pub choices: Vec<String>,
    pub allow_freeform: bool,
}

impl UserInputRequest {
    /// Check if this is a free-text question (no choices)
    pub fn is_free_text(&self) -> bool {
        self.choices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputResponse {
    pub answer: String,
    pub was_freeform: bool,
}

impl UserInputResponse {
    pub fn choice(answer: impl Into<String>) -> Self {
        Self { answer: answer.into(), was_freeform: false }
    }

    pub fn freeform(answer: impl Into<String>) -> Self {
        Self { answer: answer.into(), was_freeform: true }
    }
}

pub type UserInputHandler = Arc<
    dyn Fn(UserInputRequest) -> BoxFuture<'static, anyhow::Result<UserInputResponse>> + Send + Sync,
>;

/// Wrap an async closure as a [`UserInputHandler`]
pub fn user_input_handler<F, Fut>(handler: F) -> UserInputHandler
where
    F: Fn(UserInputRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<UserInputResponse>> + Send + 'static,
{
    Arc::new(move |request| handler(request).boxed())
}
