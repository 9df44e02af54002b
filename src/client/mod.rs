//! Client for a Copilot CLI agent running in server mode.
//!
//! The client owns the connection (and the agent process when it spawned one)
//! plus the registry of live sessions. Agent-initiated traffic is routed to
//! sessions by [`dispatch::ClientHandler`].

mod dispatch;
mod options;
mod transport;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;

pub use options::{ClientOptions, LogLevel};
#[cfg(test)]
pub(crate) use options::ConnectionMode;

use dispatch::{ClientHandler, SharedState, StateCell};
use crate::error::{CopilotError, Result};
use crate::jsonrpc::JsonRpcConnection;
use crate::log;
use crate::protocol::{
    methods, DeleteSessionResult, LastSessionIdResult, ListModelsResult, ListSessionsResult,
    ModelInfo, PingParams, PingResponse, SessionCreatedResult, SessionIdParams, SessionMetadata,
    SDK_PROTOCOL_VERSION,
};
use crate::session::{
    CopilotSession, ResumeSessionConfig, SessionConfig, SessionHandlers, SessionManager,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn display(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

/// The running connection
struct Active {
    rpc: Arc<JsonRpcConnection>,
    child: Option<Child>,
    /// Byte pipe came from `start_with_transport`; we cannot recreate it
    provided: bool,
}

struct ClientInner {
    options: ClientOptions,
    state: SharedState,
    active: tokio::sync::Mutex<Option<Active>>,
    sessions: SessionManager,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        for session in self.sessions.drain() {
            session.close();
        }
        if let Some(active) = self.active.get_mut().take() {
            active.rpc.shutdown();
        }
    }
}

/// Handle to the agent; clones share one connection
#[derive(Clone)]
pub struct CopilotClient {
    inner: Arc<ClientInner>,
}

impl CopilotClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                options,
                state: Arc::new(Mutex::new(StateCell {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                })),
                active: tokio::sync::Mutex::new(None),
                sessions: SessionManager::new(),
            }),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ConnectionState {
        self.inner
            .state
            .lock()
            .map(|cell| cell.state)
            .unwrap_or(ConnectionState::Error)
    }

    /// Live session by id
    pub fn session(&self, id: &str) -> Option<CopilotSession> {
        self.inner.sessions.get_by_id(id)
    }

    /// Ids of live sessions on this client
    pub fn session_ids(&self) -> Vec<String> {
        self.inner.sessions.ids()
    }

    /// Start a new connection generation; returns its number
    fn begin_connecting(&self) -> u64 {
        match self.inner.state.lock() {
            Ok(mut cell) => {
                cell.generation += 1;
                cell.state = ConnectionState::Connecting;
                cell.generation
            }
            Err(_) => 0,
        }
    }

    /// Set `state` if `generation` is still the current connection
    fn set_state(&self, generation: u64, state: ConnectionState) {
        if let Ok(mut cell) = self.inner.state.lock() {
            if cell.generation == generation {
                cell.state = state;
            }
        }
    }

    /// Move to `state` and orphan any handler of the previous connection
    fn reset_state(&self, state: ConnectionState) {
        if let Ok(mut cell) = self.inner.state.lock() {
            cell.generation += 1;
            cell.state = state;
        }
    }

    /// Spawn or connect to the agent and verify the protocol version.
    ///
    /// A no-op when already connected.
    pub async fn start(&self) -> Result<()> {
        let mut active = self.inner.active.lock().await;
        if is_live(&active) {
            return Ok(());
        }
        self.discard(&mut active).await;

        let generation = self.begin_connecting();
        let transport = match transport::establish(&self.inner.options).await {
            Ok(transport) => transport,
            Err(e) => {
                log::log_event(&format!("Agent start failed: {}", e));
                self.set_state(generation, ConnectionState::Error);
                return Err(e);
            }
        };

        self.handshake(
            &mut active,
            generation,
            transport.reader,
            transport.writer,
            transport.child,
            false,
        )
        .await
    }

    /// Run the client over a caller-supplied byte pipe instead of a process
    pub async fn start_with_transport<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut active = self.inner.active.lock().await;
        if is_live(&active) {
            return Ok(());
        }
        self.discard(&mut active).await;

        let generation = self.begin_connecting();
        self.handshake(&mut active, generation, reader, writer, None, true)
            .await
    }

    async fn handshake<R, W>(
        &self,
        active: &mut Option<Active>,
        generation: u64,
        reader: R,
        writer: W,
        mut child: Option<Child>,
        provided: bool,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handler = Arc::new(ClientHandler::new(
            self.inner.sessions.clone(),
            self.inner.state.clone(),
            generation,
        ));
        let rpc = Arc::new(JsonRpcConnection::new(reader, writer, handler));

        match verify_protocol(&rpc, self.inner.options.startup_timeout).await {
            Ok(ping) => {
                log::log_event(&format!(
                    "Connected to agent (protocol {})",
                    ping.protocol_version.unwrap_or_default()
                ));
                *active = Some(Active {
                    rpc,
                    child,
                    provided,
                });
                self.set_state(generation, ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                log::log_event(&format!("Handshake failed: {}", e));
                rpc.shutdown();
                if let Some(child) = child.as_mut() {
                    kill_child(child).await;
                }
                self.set_state(generation, ConnectionState::Error);
                Err(e)
            }
        }
    }

    /// Drop a dead connection and the sessions bound to it
    async fn discard(&self, active: &mut Option<Active>) {
        if let Some(mut old) = active.take() {
            old.rpc.shutdown();
            if let Some(child) = old.child.as_mut() {
                kill_child(child).await;
            }
            for session in self.inner.sessions.drain() {
                session.close();
            }
        }
    }

    /// Destroy every session, then close the connection and the agent.
    ///
    /// Session failures do not stop the shutdown; they are returned together
    /// as [`CopilotError::Shutdown`].
    pub async fn stop(&self) -> Result<()> {
        let mut errors = Vec::new();
        for session in self.inner.sessions.drain() {
            if let Err(e) = session.destroy().await {
                errors.push(format!("session {}: {}", session.id(), e));
            }
        }

        let mut active = self.inner.active.lock().await;
        if let Some(mut old) = active.take() {
            old.rpc.shutdown();
            if let Some(child) = old.child.as_mut() {
                kill_child(child).await;
            }
        }
        self.reset_state(ConnectionState::Disconnected);
        log::log_event("Client stopped");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CopilotError::Shutdown(errors))
        }
    }

    /// Kill the connection without telling the agent about sessions
    pub async fn force_stop(&self) {
        for session in self.inner.sessions.drain() {
            session.close();
        }
        let mut active = self.inner.active.lock().await;
        if let Some(mut old) = active.take() {
            old.rpc.shutdown();
            if let Some(child) = old.child.as_mut() {
                kill_child(child).await;
            }
        }
        self.reset_state(ConnectionState::Disconnected);
        log::log_event("Client force-stopped");
    }

    /// Live connection, starting or restarting one when the options allow
    async fn connection(&self) -> Result<Arc<JsonRpcConnection>> {
        let may_start = {
            let active = self.inner.active.lock().await;
            match active.as_ref() {
                Some(active) if !active.rpc.is_closed() => return Ok(active.rpc.clone()),
                Some(active) if active.provided => return Err(CopilotError::ConnectionClosed),
                Some(_) => self.inner.options.auto_restart,
                None => self.inner.options.auto_start,
            }
        };
        if !may_start {
            return Err(CopilotError::NotConnected);
        }

        self.start().await?;
        let active = self.inner.active.lock().await;
        active
            .as_ref()
            .map(|active| active.rpc.clone())
            .ok_or(CopilotError::NotConnected)
    }

    pub async fn ping(&self, message: Option<&str>) -> Result<PingResponse> {
        let rpc = self.connection().await?;
        let params = serde_json::to_value(PingParams {
            message: message.map(str::to_string),
        })?;
        rpc.request(methods::PING, Some(params)).await
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let rpc = self.connection().await?;
        let result: ListModelsResult = rpc.request(methods::MODELS_LIST, Some(json!({}))).await?;
        Ok(result.models)
    }

    pub async fn create_session(&self, config: SessionConfig) -> Result<CopilotSession> {
        let (params, handlers) = config.into_parts()?;
        let rpc = self.connection().await?;
        let created: SessionCreatedResult = rpc
            .request(methods::SESSION_CREATE, Some(serde_json::to_value(&params)?))
            .await?;
        log::log_event(&format!("Session {} created", created.session_id));
        Ok(self.register(created, rpc, handlers))
    }

    /// Reattach to a stored session
    pub async fn resume_session(
        &self,
        session_id: &str,
        config: ResumeSessionConfig,
    ) -> Result<CopilotSession> {
        let (params, handlers) = config.into_parts(session_id)?;
        let rpc = self.connection().await?;
        let created: SessionCreatedResult = rpc
            .request(methods::SESSION_RESUME, Some(serde_json::to_value(&params)?))
            .await?;
        log::log_event(&format!("Session {} resumed", created.session_id));
        Ok(self.register(created, rpc, handlers))
    }

    fn register(
        &self,
        created: SessionCreatedResult,
        rpc: Arc<JsonRpcConnection>,
        handlers: SessionHandlers,
    ) -> CopilotSession {
        if let Some(stale) = self.inner.sessions.get_by_id(&created.session_id) {
            stale.close();
        }
        let session = CopilotSession::new(
            created.session_id,
            created.workspace_path.map(PathBuf::from),
            rpc,
            handlers,
            self.inner.sessions.downgrade(),
        );
        self.inner.sessions.add_session(session.clone());
        session
    }

    /// Sessions the agent has stored, live or not
    pub async fn list_sessions(&self) -> Result<Vec<SessionMetadata>> {
        let rpc = self.connection().await?;
        let result: ListSessionsResult = rpc.request(methods::SESSION_LIST, Some(json!({}))).await?;
        Ok(result.sessions)
    }

    /// Remove a stored session from the agent
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let rpc = self.connection().await?;
        let params = serde_json::to_value(SessionIdParams { session_id })?;
        let result: DeleteSessionResult = rpc.request(methods::SESSION_DELETE, Some(params)).await?;
        if result.success {
            if let Some(live) = self.inner.sessions.get_by_id(session_id) {
                live.close();
            }
            Ok(())
        } else {
            Err(CopilotError::SessionError(result.error.unwrap_or_else(|| {
                format!("failed to delete session {}", session_id)
            })))
        }
    }

    /// Most recently used stored session, if any
    pub async fn get_last_session_id(&self) -> Result<Option<String>> {
        let rpc = self.connection().await?;
        let result: LastSessionIdResult = rpc
            .request(methods::SESSION_GET_LAST_ID, Some(json!({})))
            .await?;
        Ok(result.session_id)
    }
}

impl std::fmt::Debug for CopilotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopilotClient")
            .field("state", &self.state())
            .field("sessions", &self.inner.sessions.len())
            .finish_non_exhaustive()
    }
}

fn is_live(active: &Option<Active>) -> bool {
    active.as_ref().is_some_and(|active| !active.rpc.is_closed())
}

async fn verify_protocol(rpc: &JsonRpcConnection, timeout: Duration) -> Result<PingResponse> {
    let params: Value = serde_json::to_value(PingParams { message: None })?;
    let ping: PingResponse = tokio::time::timeout(timeout, rpc.request(methods::PING, Some(params)))
        .await
        .map_err(|_| CopilotError::Timeout(timeout.as_millis() as u64))??;

    match ping.protocol_version {
        Some(version) if version == SDK_PROTOCOL_VERSION => Ok(ping),
        actual => Err(CopilotError::ProtocolMismatch {
            expected: SDK_PROTOCOL_VERSION,
            actual,
        }),
    }
}

async fn kill_child(child: &mut Child) {
    if let Err(e) = child.kill().await {
        log::log_event(&format!("Failed to kill agent: {}", e));
    }
}
