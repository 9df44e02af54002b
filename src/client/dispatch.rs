//! Routes agent-initiated traffic to the owning session

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::ConnectionState;
use crate::events::SessionEvent;
use crate::jsonrpc::{IncomingHandler, JsonRpcError};
use crate::log;
use crate::protocol::{
    methods, PermissionRequestParams, SessionEventParams, ToolCallParams, UserInputRequestParams,
};
use crate::session::{CopilotSession, SessionManager};

/// Connection state tagged with the connection it belongs to
#[derive(Debug)]
pub(crate) struct StateCell {
    pub state: ConnectionState,
    pub generation: u64,
}

pub(crate) type SharedState = Arc<Mutex<StateCell>>;

pub(crate) struct ClientHandler {
    sessions: SessionManager,
    state: SharedState,
    generation: u64,
}

impl ClientHandler {
    pub fn new(sessions: SessionManager, state: SharedState, generation: u64) -> Self {
        Self {
            sessions,
            state,
            generation,
        }
    }

    fn session(&self, id: &str) -> Result<CopilotSession, JsonRpcError> {
        self.sessions
            .get_by_id(id)
            .ok_or_else(|| JsonRpcError::server(format!("Unknown session {}", id)))
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(JsonRpcError::invalid_params)
}

#[async_trait]
impl IncomingHandler for ClientHandler {
    async fn on_notification(&self, method: String, params: Option<Value>) {
        if method != methods::SESSION_EVENT {
            log::log_event(&format!("Ignoring notification {}", method));
            return;
        }

        let params: SessionEventParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => {
                log::log_event(&format!("Malformed session.event: {}", e.message));
                return;
            }
        };

        match self.sessions.get_by_id(&params.session_id) {
            Some(session) => session.dispatch_event(SessionEvent::from_value(params.event)),
            None => log::log_event(&format!(
                "Dropping event for unknown session {}",
                params.session_id
            )),
        }
    }

    async fn on_request(&self, method: String, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method.as_str() {
            methods::TOOL_CALL => {
                let params: ToolCallParams = parse_params(params)?;
                let session = self.session(&params.session_id)?;
                log::log_event(&format!(
                    "Tool call {} ({}) in session {}",
                    params.tool_name, params.tool_call_id, params.session_id
                ));
                let result = session.handle_tool_call(params).await;
                Ok(json!({ "result": result }))
            }
            methods::PERMISSION_REQUEST => {
                let params: PermissionRequestParams = parse_params(params)?;
                let session = self.session(&params.session_id)?;
                let result = session.handle_permission(params.permission_request).await;
                Ok(json!({ "result": result }))
            }
            methods::USER_INPUT_REQUEST => {
                let params: UserInputRequestParams = parse_params(params)?;
                let session = self.session(&params.session_id)?;
                let response = session.handle_user_input(params).await?;
                serde_json::to_value(response).map_err(JsonRpcError::internal)
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn on_close(&self) {
        let current = match self.state.lock() {
            Ok(mut cell) if cell.generation == self.generation => {
                if cell.state == ConnectionState::Connected {
                    cell.state = ConnectionState::Error;
                }
                true
            }
            _ => false,
        };
        if !current {
            return;
        }

        log::log_event("Agent connection lost; closing sessions");
        for session in self.sessions.drain() {
            session.close();
        }
    }
}
