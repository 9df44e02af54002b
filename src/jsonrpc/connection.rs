//! Bidirectional JSON-RPC connection over an async byte stream.
//!
//! Two tasks own the stream halves. The writer drains an outgoing queue; the
//! reader decodes frames and either resolves a pending request, hands a
//! notification to the [`IncomingHandler`] inline, or spawns a task to answer a
//! request from the agent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::ContentLengthCodec;
use super::message::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};
use crate::error::{CopilotError, Result};
use crate::log;

/// Receives traffic initiated by the agent
#[async_trait]
pub trait IncomingHandler: Send + Sync + 'static {
    /// Called on the reader task; notifications arrive in wire order.
    async fn on_notification(&self, method: String, params: Option<Value>);

    /// Called on a dedicated task per request.
    async fn on_request(&self, method: String, params: Option<Value>)
        -> std::result::Result<Value, JsonRpcError>;

    /// Called once when the stream ends or fails.
    fn on_close(&self) {}
}

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Result<Value>>>>>;

/// Handle to a running JSON-RPC connection
pub struct JsonRpcConnection {
    outgoing: mpsc::Sender<String>,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl JsonRpcConnection {
    /// Start the reader and writer tasks over the given stream halves
    pub fn new<R, W>(reader: R, writer: W, handler: Arc<dyn IncomingHandler>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer_task = tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, ContentLengthCodec::new());
            while let Some(frame) = rx.recv().await {
                log::log_outgoing(&frame);
                if let Err(e) = sink.send(frame).await {
                    log::log_event(&format!("Write failed: {}", e));
                    break;
                }
            }
        });

        let reader_task = {
            let pending = pending.clone();
            let closed = closed.clone();
            let response_tx = tx.clone();
            tokio::spawn(async move {
                let mut frames = FramedRead::new(reader, ContentLengthCodec::new());

                while let Some(frame) = frames.next().await {
                    let frame = match frame {
                        Ok(frame) => frame,
                        Err(e) => {
                            log::log_event(&format!("Framing error, closing connection: {}", e));
                            break;
                        }
                    };

                    log::log_incoming(&frame);

                    match IncomingMessage::parse(&frame) {
                        Ok(IncomingMessage::Response(resp)) => {
                            let Some(id) = resp.id.clone() else {
                                log::log_event("Response without id");
                                continue;
                            };
                            let waiter = pending.lock().ok().and_then(|mut p| p.remove(&id));
                            match waiter {
                                Some(waiter) => {
                                    let _ = waiter.send(resp.into_result().map_err(CopilotError::from));
                                }
                                None => log::log_event(&format!("Response for unknown request id={}", id)),
                            }
                        }
                        Ok(IncomingMessage::Notification { method, params }) => {
                            handler.on_notification(method, params).await;
                        }
                        Ok(IncomingMessage::Request { id, method, params }) => {
                            log::log_event(&format!("Request: {} (id={})", method, id));
                            let handler = handler.clone();
                            let response_tx = response_tx.clone();
                            tokio::spawn(async move {
                                let response = match handler.on_request(method, params).await {
                                    Ok(result) => JsonRpcResponse::success(id, result),
                                    Err(error) => JsonRpcResponse::failure(id, error),
                                };
                                match serde_json::to_string(&response) {
                                    Ok(json) => {
                                        let _ = response_tx.send(json).await;
                                    }
                                    Err(e) => log::log_event(&format!("Failed to encode response: {}", e)),
                                }
                            });
                        }
                        Err(e) => {
                            log::log_event(&format!("Parse error: {}", e));
                        }
                    }
                }

                fail_pending(&closed, &pending);
                handler.on_close();
                log::log_event("Connection closed");
            })
        };

        Self {
            outgoing: tx,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            tasks: Mutex::new(vec![reader_task, writer_task]),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its raw result
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.is_closed() {
            return Err(CopilotError::ConnectionClosed);
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| CopilotError::Protocol("pending request table poisoned".into()))?
            .insert(id.clone(), tx);

        // The reader may have drained the table between the check above and the insert.
        if self.is_closed() {
            self.forget(&id);
            return Err(CopilotError::ConnectionClosed);
        }

        let json = serde_json::to_string(&JsonRpcRequest::new(id.clone(), method, params))?;
        if self.outgoing.send(json).await.is_err() {
            self.forget(&id);
            return Err(CopilotError::ConnectionClosed);
        }

        rx.await.map_err(|_| CopilotError::ConnectionClosed)?
    }

    /// Send a request and deserialize its result
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let value = self.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send a notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.is_closed() {
            return Err(CopilotError::ConnectionClosed);
        }
        let json = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.outgoing
            .send(json)
            .await
            .map_err(|_| CopilotError::ConnectionClosed)
    }

    /// Stop both tasks and fail outstanding requests; `on_close` is not called
    pub fn shutdown(&self) {
        fail_pending(&self.closed, &self.pending);
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    fn forget(&self, id: &RequestId) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(id);
        }
    }
}

impl Drop for JsonRpcConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn fail_pending(closed: &AtomicBool, pending: &PendingMap) {
    closed.store(true, Ordering::SeqCst);
    let drained: Vec<_> = match pending.lock() {
        Ok(mut pending) => pending.drain().map(|(_, waiter)| waiter).collect(),
        Err(_) => Vec::new(),
    };
    for waiter in drained {
        let _ = waiter.send(Err(CopilotError::ConnectionClosed));
    }
}
