//! A live conversation with the agent.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use super::config::SessionHandlers;
use super::manager::WeakSessionManager;
use super::state::SessionState;
use super::subscribers::{self, EventStream, SharedSubscribers, Subscription};
use crate::error::{CopilotError, Result};
use crate::events::{SessionEvent, SessionEventData};
use crate::jsonrpc::{JsonRpcConnection, JsonRpcError};
use crate::log;
use crate::permission::{self, PermissionInvocation, PermissionResult, UserInputRequest, UserInputResponse};
use crate::protocol::{
    methods, GetMessagesResult, MessageOptions, SendParams, SendResult, SessionIdParams,
    ToolCallParams, UserInputRequestParams,
};
use crate::tools::{ToolInvocation, ToolRegistry, ToolResult};

/// How long `send_and_wait` waits for `session.idle` by default
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(60);

struct SessionInner {
    id: String,
    workspace_path: Option<PathBuf>,
    connection: Arc<JsonRpcConnection>,
    handlers: SessionHandlers,
    subscribers: SharedSubscribers,
    state: Mutex<SessionState>,
    manager: WeakSessionManager,
}

/// Handle to one session; clones share the same conversation
#[derive(Clone)]
pub struct CopilotSession {
    inner: Arc<SessionInner>,
}

impl CopilotSession {
    pub(crate) fn new(
        id: String,
        workspace_path: Option<PathBuf>,
        connection: Arc<JsonRpcConnection>,
        handlers: SessionHandlers,
        manager: WeakSessionManager,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                workspace_path,
                connection,
                handlers,
                subscribers: Arc::default(),
                state: Mutex::new(SessionState::Idle),
                manager,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Same underlying session, not merely the same id
    pub(crate) fn ptr_eq(&self, other: &CopilotSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Directory the agent keeps session artifacts in, when it reports one
    pub fn workspace_path(&self) -> Option<&Path> {
        self.inner.workspace_path.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.inner
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::Destroyed)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.handlers.tools
    }

    /// Move to `target` if the transition is valid; returns the prior state
    fn transition(&self, target: SessionState) -> SessionState {
        match self.inner.state.lock() {
            Ok(mut state) => {
                let prior = *state;
                if prior.can_transition_to(target) {
                    *state = target;
                }
                prior
            }
            Err(_) => SessionState::Destroyed,
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state().is_destroyed() {
            return Err(CopilotError::SessionDestroyed(self.inner.id.clone()));
        }
        Ok(())
    }

    fn id_params(&self) -> Result<Option<Value>> {
        Ok(Some(serde_json::to_value(SessionIdParams {
            session_id: &self.inner.id,
        })?))
    }

    /// Send a user message; returns the agent's message id.
    ///
    /// Returns once the agent has accepted the message. Output arrives as
    /// events; see [`subscribe`](Self::subscribe) and [`on`](Self::on).
    pub async fn send(&self, options: impl Into<MessageOptions>) -> Result<String> {
        self.ensure_live()?;
        let options = options.into();
        let params = serde_json::to_value(SendParams {
            session_id: &self.inner.id,
            message: &options,
        })?;

        // Busy before the request: `session.idle` may beat the response.
        let prior = self.transition(SessionState::Busy);
        match self
            .inner
            .connection
            .request::<SendResult>(methods::SESSION_SEND, Some(params))
            .await
        {
            Ok(result) => Ok(result.message_id),
            Err(e) => {
                if prior == SessionState::Idle {
                    self.transition(SessionState::Idle);
                }
                Err(e)
            }
        }
    }

    /// Send a message and wait for the session to go idle.
    ///
    /// Resolves to the last `assistant.message` of the turn, or `None` when the
    /// turn produced none. A `session.error` fails the call. Hitting `timeout`
    /// (default [`DEFAULT_SEND_TIMEOUT`]) fails with `Timeout` but does not
    /// abort the agent; call [`abort`](Self::abort) for that.
    pub async fn send_and_wait(
        &self,
        options: impl Into<MessageOptions>,
        timeout: Option<Duration>,
    ) -> Result<Option<SessionEvent>> {
        let timeout = timeout.unwrap_or(DEFAULT_SEND_TIMEOUT);
        let mut events = self.subscribe();
        self.send(options).await?;

        let wait = async {
            let mut last_message = None;
            while let Some(event) = events.recv().await {
                if matches!(event.data, SessionEventData::AssistantMessage(_)) {
                    last_message = Some(event);
                    continue;
                }
                match &event.data {
                    SessionEventData::SessionIdle => return Ok(last_message),
                    SessionEventData::SessionError(err) => {
                        return Err(CopilotError::SessionError(err.message.clone()));
                    }
                    // session.error whose payload did not decode still ends the turn
                    SessionEventData::Other { event_type, data } if event_type == "session.error" => {
                        let message = data
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("session error");
                        return Err(CopilotError::SessionError(message.to_string()));
                    }
                    _ => {}
                }
            }
            Err(CopilotError::ConnectionClosed)
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(CopilotError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Stream every event from now on
    pub fn subscribe(&self) -> EventStream {
        subscribers::add_stream(&self.inner.subscribers)
    }

    /// Run `callback` for every event from now on.
    ///
    /// Callbacks run on the connection reader; keep them short.
    pub fn on<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        subscribers::add_callback(&self.inner.subscribers, Arc::new(callback))
    }

    /// Stop the current turn
    pub async fn abort(&self) -> Result<()> {
        self.ensure_live()?;
        self.inner
            .connection
            .call(methods::SESSION_ABORT, self.id_params()?)
            .await?;
        Ok(())
    }

    /// Full event history of the session
    pub async fn get_messages(&self) -> Result<Vec<SessionEvent>> {
        self.ensure_live()?;
        let result: GetMessagesResult = self
            .inner
            .connection
            .request(methods::SESSION_GET_MESSAGES, self.id_params()?)
            .await?;
        Ok(result.events)
    }

    /// Release the session on the agent; idempotent.
    ///
    /// Local teardown (streams ended, handle deregistered) happens even when
    /// the agent call fails.
    pub async fn destroy(&self) -> Result<()> {
        if self.transition(SessionState::Destroyed).is_destroyed() {
            return Ok(());
        }
        let result = match self.id_params() {
            Ok(params) => self
                .inner
                .connection
                .call(methods::SESSION_DESTROY, params)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        self.teardown();
        log::log_event(&format!("Session {} destroyed", self.inner.id));
        result
    }

    /// Connection lost or client stopped: end streams without talking to the agent
    pub(crate) fn close(&self) {
        self.transition(SessionState::Destroyed);
        self.teardown();
    }

    fn teardown(&self) {
        subscribers::close(&self.inner.subscribers);
        self.inner.manager.remove(self);
    }

    pub(crate) fn dispatch_event(&self, event: SessionEvent) {
        if event.is_idle() {
            self.transition(SessionState::Idle);
        }
        subscribers::dispatch(&self.inner.subscribers, &event);
    }

    pub(crate) async fn handle_tool_call(&self, params: ToolCallParams) -> ToolResult {
        let invocation = ToolInvocation {
            session_id: params.session_id,
            tool_call_id: params.tool_call_id,
            tool_name: params.tool_name,
            arguments: params.arguments,
        };
        self.inner.handlers.tools.invoke(invocation).await
    }

    pub(crate) async fn handle_permission(&self, request: Value) -> PermissionResult {
        permission::resolve_permission(
            self.inner.handlers.permission.as_ref(),
            request,
            PermissionInvocation {
                session_id: self.inner.id.clone(),
            },
        )
        .await
    }

    pub(crate) async fn handle_user_input(
        &self,
        params: UserInputRequestParams,
    ) -> std::result::Result<UserInputResponse, JsonRpcError> {
        let Some(handler) = self.inner.handlers.user_input.as_ref() else {
            return Err(JsonRpcError::server(format!(
                "Session {} has no user input handler",
                self.inner.id
            )));
        };
        let request = UserInputRequest {
            session_id: params.session_id,
            question: params.question,
            choices: params.choices,
            allow_freeform: params.allow_freeform.unwrap_or(true),
        };
        handler(request)
            .await
            .map_err(|e| JsonRpcError::server(format!("User input handler failed: {}", e)))
    }
}

impl fmt::Debug for CopilotSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopilotSession")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("tools", &self.inner.handlers.tools.names())
            .finish()
    }
}
