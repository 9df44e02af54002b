//! Session events streamed from the agent.
//!
//! Events arrive as `session.event` notifications carrying
//! `{id, timestamp, parentId?, ephemeral?, type, data}`. Known types decode into
//! typed payloads; anything else (including a known type with malformed data)
//! becomes [`SessionEventData::Other`] so a newer agent never breaks the stream.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartData {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub selected_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionErrorData {
    #[serde(default)]
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoData {
    #[serde(default)]
    pub info_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelChangeData {
    #[serde(default)]
    pub previous_model: Option<String>,
    pub new_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserMessageData {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnData {
    pub turn_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentData {
    pub intent: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningData {
    pub reasoning_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningDeltaData {
    pub reasoning_id: String,
    pub delta_content: String,
}

/// Tool call the assistant asked for within a message
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub tool_call_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessageData {
    pub message_id: String,
    pub content: String,
    #[serde(default)]
    pub tool_requests: Vec<ToolRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeltaData {
    pub message_id: String,
    pub delta_content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageData {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbortData {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionStartData {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPartialResultData {
    pub tool_call_id: String,
    pub partial_output: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionCompleteData {
    pub tool_call_id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Event payload keyed by wire type
#[derive(Debug, Clone)]
pub enum SessionEventData {
    SessionStart(SessionStartData),
    SessionResume,
    SessionIdle,
    SessionError(SessionErrorData),
    SessionInfo(SessionInfoData),
    SessionModelChange(ModelChangeData),
    UserMessage(UserMessageData),
    AssistantTurnStart(TurnData),
    AssistantIntent(IntentData),
    AssistantReasoning(ReasoningData),
    AssistantReasoningDelta(ReasoningDeltaData),
    AssistantMessage(AssistantMessageData),
    AssistantMessageDelta(MessageDeltaData),
    AssistantTurnEnd(TurnData),
    AssistantUsage(UsageData),
    Abort(AbortData),
    ToolExecutionStart(ToolExecutionStartData),
    ToolExecutionPartialResult(ToolPartialResultData),
    ToolExecutionComplete(ToolExecutionCompleteData),
    Other { event_type: String, data: Value },
}

impl SessionEventData {
    /// Decode `data` for `event_type`, falling back to `Other`
    pub fn decode(event_type: &str, data: Value) -> Self {
        fn typed<T: DeserializeOwned>(data: &Value) -> Option<T> {
            serde_json::from_value(data.clone()).ok()
        }

        use SessionEventData::*;
        let decoded = match event_type {
            "session.start" => typed(&data).map(SessionStart),
            "session.resume" => Some(SessionResume),
            "session.idle" => Some(SessionIdle),
            "session.error" => typed(&data).map(SessionError),
            "session.info" => typed(&data).map(SessionInfo),
            "session.model_change" => typed(&data).map(SessionModelChange),
            "user.message" => typed(&data).map(UserMessage),
            "assistant.turn_start" => typed(&data).map(AssistantTurnStart),
            "assistant.intent" => typed(&data).map(AssistantIntent),
            "assistant.reasoning" => typed(&data).map(AssistantReasoning),
            "assistant.reasoning_delta" => typed(&data).map(AssistantReasoningDelta),
            "assistant.message" => typed(&data).map(AssistantMessage),
            "assistant.message_delta" => typed(&data).map(AssistantMessageDelta),
            "assistant.turn_end" => typed(&data).map(AssistantTurnEnd),
            "assistant.usage" => typed(&data).map(AssistantUsage),
            "abort" => typed(&data).map(Abort),
            "tool.execution_start" => typed(&data).map(ToolExecutionStart),
            "tool.execution_partial_result" => typed(&data).map(ToolExecutionPartialResult),
            "tool.execution_complete" => typed(&data).map(ToolExecutionComplete),
            _ => None,
        };

        decoded.unwrap_or_else(|| Other {
            event_type: event_type.to_string(),
            data,
        })
    }

    /// Wire type string, e.g. `assistant.message_delta`
    pub fn event_type(&self) -> &str {
        use SessionEventData::*;
        match self {
            SessionStart(_) => "session.start",
            SessionResume => "session.resume",
            SessionIdle => "session.idle",
            SessionError(_) => "session.error",
            SessionInfo(_) => "session.info",
            SessionModelChange(_) => "session.model_change",
            UserMessage(_) => "user.message",
            AssistantTurnStart(_) => "assistant.turn_start",
            AssistantIntent(_) => "assistant.intent",
            AssistantReasoning(_) => "assistant.reasoning",
            AssistantReasoningDelta(_) => "assistant.reasoning_delta",
            AssistantMessage(_) => "assistant.message",
            AssistantMessageDelta(_) => "assistant.message_delta",
            AssistantTurnEnd(_) => "assistant.turn_end",
            AssistantUsage(_) => "assistant.usage",
            Abort(_) => "abort",
            ToolExecutionStart(_) => "tool.execution_start",
            ToolExecutionPartialResult(_) => "tool.execution_partial_result",
            ToolExecutionComplete(_) => "tool.execution_complete",
            Other { event_type, .. } => event_type.as_str(),
        }
    }
}

/// One event in a session's history
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub parent_id: Option<String>,
    pub ephemeral: bool,
    pub data: SessionEventData,
}

impl SessionEvent {
    pub fn from_value(value: Value) -> Self {
        let str_field = |name: &str| value.get(name).and_then(|v| v.as_str()).map(|s| s.to_string());

        let id = str_field("id").unwrap_or_default();
        let timestamp = str_field("timestamp")
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc));
        let parent_id = str_field("parentId");
        let ephemeral = value.get("ephemeral").and_then(|v| v.as_bool()).unwrap_or(false);
        let event_type = str_field("type").unwrap_or_default();

        let data = match value.get("data") {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(data) => data.clone(),
        };

        Self {
            id,
            timestamp,
            parent_id,
            ephemeral,
            data: SessionEventData::decode(&event_type, data),
        }
    }

    pub fn event_type(&self) -> &str {
        self.data.event_type()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.data, SessionEventData::SessionIdle)
    }

    /// Full text of an `assistant.message` event
    pub fn assistant_message_content(&self) -> Option<&str> {
        match &self.data {
            SessionEventData::AssistantMessage(msg) => Some(&msg.content),
            _ => None,
        }
    }

    /// Incremental text of an `assistant.message_delta` event
    pub fn delta_content(&self) -> Option<&str> {
        match &self.data {
            SessionEventData::AssistantMessageDelta(delta) => Some(&delta.delta_content),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for SessionEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(SessionEvent::from_value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_delta() {
        let event = SessionEvent::from_value(json!({
            "id": "e1",
            "timestamp": "2025-06-01T12:00:00.000Z",
            "ephemeral": true,
            "type": "assistant.message_delta",
            "data": {"messageId": "m1", "deltaContent": "Hel"}
        }));
        assert_eq!(event.event_type(), "assistant.message_delta");
        assert_eq!(event.delta_content(), Some("Hel"));
        assert!(event.ephemeral);
        assert!(event.timestamp.is_some());
    }

    #[test]
    fn test_idle_without_data() {
        let event = SessionEvent::from_value(json!({"id": "e2", "type": "session.idle"}));
        assert!(event.is_idle());
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn test_assistant_message_with_tool_requests() {
        let event = SessionEvent::from_value(json!({
            "id": "e3",
            "parentId": "e2",
            "type": "assistant.message",
            "data": {
                "messageId": "m1",
                "content": "Checking the weather.",
                "toolRequests": [
                    {"toolCallId": "t1", "name": "get_weather", "arguments": {"city": "Oslo"}}
                ]
            }
        }));
        assert_eq!(event.parent_id.as_deref(), Some("e2"));
        assert_eq!(event.assistant_message_content(), Some("Checking the weather."));
        let SessionEventData::AssistantMessage(msg) = &event.data else {
            panic!("expected assistant.message");
        };
        assert_eq!(msg.tool_requests[0].name, "get_weather");
        assert_eq!(msg.tool_requests[0].arguments["city"], "Oslo");
    }

    #[test]
    fn test_unknown_type_kept_as_other() {
        let event = SessionEvent::from_value(json!({
            "id": "e4",
            "type": "subagent.started",
            "data": {"agentName": "reviewer"}
        }));
        assert_eq!(event.event_type(), "subagent.started");
        match event.data {
            SessionEventData::Other { data, .. } => assert_eq!(data["agentName"], "reviewer"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_known_type_falls_back() {
        let event = SessionEvent::from_value(json!({
            "id": "e5",
            "type": "session.error",
            "data": {"errorType": "model"}
        }));
        assert_eq!(event.event_type(), "session.error");
        assert!(matches!(event.data, SessionEventData::Other { .. }));
    }

    #[test]
    fn test_deserialize_list() {
        let events: Vec<SessionEvent> = serde_json::from_value(json!([
            {"id": "a", "type": "user.message", "data": {"content": "hi"}},
            {"id": "b", "type": "session.error", "data": {"errorType": "auth", "message": "bad token"}}
        ]))
        .unwrap();
        assert_eq!(events.len(), 2);
        let SessionEventData::SessionError(err) = &events[1].data else {
            panic!("expected session.error");
        };
        assert_eq!(err.message, "bad token");
    }
}
