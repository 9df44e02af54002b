//! Scripted agent on the far side of an in-memory pipe

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::client::{ClientOptions, CopilotClient};
use crate::jsonrpc::ContentLengthCodec;
use crate::protocol::SDK_PROTOCOL_VERSION;
use crate::session::{CopilotSession, SessionConfig};

type AgentReader = Box<dyn AsyncRead + Send + Unpin>;
type AgentWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) struct MockAgent {
    frames: FramedRead<AgentReader, ContentLengthCodec>,
    sink: FramedWrite<AgentWriter, ContentLengthCodec>,
    next_id: u64,
}

impl MockAgent {
    fn new(reader: AgentReader, writer: AgentWriter) -> Self {
        Self {
            frames: FramedRead::new(reader, ContentLengthCodec::new()),
            sink: FramedWrite::new(writer, ContentLengthCodec::new()),
            next_id: 0,
        }
    }

    /// Agent side of an accepted TCP connection
    pub fn over_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(Box::new(reader), Box::new(writer))
    }

    pub async fn recv(&mut self) -> Value {
        let frame = self
            .frames
            .next()
            .await
            .expect("client closed the pipe")
            .expect("bad frame from client");
        serde_json::from_str(&frame).expect("client sent invalid JSON")
    }

    /// Next frame must be a request for `method`; returns `(id, params)`
    pub async fn expect_request(&mut self, method: &str) -> (Value, Value) {
        let msg = self.recv().await;
        assert_eq!(msg["method"], method, "unexpected frame: {}", msg);
        assert!(msg.get("id").is_some(), "expected a request: {}", msg);
        (msg["id"].clone(), msg.get("params").cloned().unwrap_or(Value::Null))
    }

    pub async fn send(&mut self, msg: Value) {
        self.sink.send(msg.to_string()).await.expect("pipe closed");
    }

    pub async fn respond(&mut self, id: Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await;
    }

    pub async fn respond_error(&mut self, id: Value, code: i64, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    pub async fn emit(&mut self, session_id: &str, event_type: &str, data: Value) {
        self.next_id += 1;
        let event = json!({
            "id": format!("evt-{}", self.next_id),
            "timestamp": "2026-01-01T00:00:00Z",
            "type": event_type,
            "data": data,
        });
        self.send(json!({
            "jsonrpc": "2.0",
            "method": "session.event",
            "params": {"sessionId": session_id, "event": event}
        }))
        .await;
    }

    /// Issue an agent-side request and wait for the client's full response
    pub async fn call(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = format!("agent-{}", self.next_id);
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        loop {
            let msg = self.recv().await;
            if msg["id"] == id && msg.get("method").is_none() {
                return msg;
            }
        }
    }
}

pub(crate) fn pipe() -> (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>, MockAgent) {
    let (client_io, agent_io) = tokio::io::duplex(1 << 16);
    let (reader, writer) = tokio::io::split(client_io);
    let (agent_reader, agent_writer) = tokio::io::split(agent_io);
    let agent = MockAgent::new(Box::new(agent_reader), Box::new(agent_writer));
    (reader, writer, agent)
}

pub(crate) fn ping_ok() -> Value {
    json!({"message": "pong", "timestamp": 0, "protocolVersion": SDK_PROTOCOL_VERSION})
}

/// Client connected to a mock agent that has answered the handshake
pub(crate) async fn connected_client() -> (CopilotClient, MockAgent) {
    let (reader, writer, mut agent) = pipe();
    let client = CopilotClient::new(ClientOptions {
        auto_start: false,
        auto_restart: false,
        ..Default::default()
    });

    let start = tokio::spawn({
        let client = client.clone();
        async move { client.start_with_transport(reader, writer).await }
    });
    let (id, _) = agent.expect_request("ping").await;
    agent.respond(id, ping_ok()).await;
    start.await.unwrap().unwrap();

    (client, agent)
}

/// Create a session the agent names `session_id`; returns the create params too
pub(crate) async fn open_session(
    client: &CopilotClient,
    agent: &mut MockAgent,
    session_id: &str,
    config: SessionConfig,
) -> (CopilotSession, Value) {
    let create = tokio::spawn({
        let client = client.clone();
        async move { client.create_session(config).await }
    });
    let (id, params) = agent.expect_request("session.create").await;
    agent
        .respond(id, json!({"sessionId": session_id, "workspacePath": "/tmp/ws"}))
        .await;
    (create.await.unwrap().unwrap(), params)
}
