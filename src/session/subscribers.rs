//! Fan-out of session events to callbacks and streams.
//!
//! Dispatch runs on the connection reader, one event at a time, so every
//! subscriber observes events in wire order. Streams use unbounded queues so a
//! slow consumer never stalls the reader.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::events::SessionEvent;
use crate::log;

pub(crate) type Callback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Clone)]
enum Listener {
    Callback(Callback),
    Channel(mpsc::UnboundedSender<SessionEvent>),
}

#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
    closed: bool,
}

pub(crate) type SharedSubscribers = Arc<Mutex<Subscribers>>;

impl Subscribers {
    fn add(&mut self, listener: Listener) -> Option<u64> {
        if self.closed {
            return None;
        }
        self.next_id += 1;
        self.listeners.push((self.next_id, listener));
        Some(self.next_id)
    }

    fn remove(&mut self, id: u64) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

pub(crate) fn add_callback(subscribers: &SharedSubscribers, callback: Callback) -> Subscription {
    let id = subscribers
        .lock()
        .ok()
        .and_then(|mut s| s.add(Listener::Callback(callback)));
    Subscription {
        id,
        subscribers: Arc::downgrade(subscribers),
    }
}

pub(crate) fn add_stream(subscribers: &SharedSubscribers) -> EventStream {
    let (tx, rx) = mpsc::unbounded_channel();
    // When closed, `tx` is dropped here and the stream ends immediately.
    let id = subscribers
        .lock()
        .ok()
        .and_then(|mut s| s.add(Listener::Channel(tx)));
    EventStream {
        rx,
        _subscription: Subscription {
            id,
            subscribers: Arc::downgrade(subscribers),
        },
    }
}

/// Deliver `event` to every listener registered right now
pub(crate) fn dispatch(subscribers: &SharedSubscribers, event: &SessionEvent) {
    let snapshot = match subscribers.lock() {
        Ok(s) => s.listeners.clone(),
        Err(_) => return,
    };

    let mut gone = Vec::new();
    for (id, listener) in snapshot {
        match listener {
            Listener::Callback(callback) => {
                if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                    log::log_event(&format!(
                        "Event callback {} panicked on {}",
                        id,
                        event.event_type()
                    ));
                }
            }
            Listener::Channel(tx) => {
                if tx.send(event.clone()).is_err() {
                    gone.push(id);
                }
            }
        }
    }

    if !gone.is_empty() {
        if let Ok(mut s) = subscribers.lock() {
            for id in gone {
                s.remove(id);
            }
        }
    }
}

/// Drop every listener and refuse new ones; open streams end
pub(crate) fn close(subscribers: &SharedSubscribers) {
    if let Ok(mut s) = subscribers.lock() {
        s.closed = true;
        s.listeners.clear();
    }
}

/// Registration handle; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    id: Option<u64>,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    /// Keep the listener registered for the life of the session
    pub fn detach(mut self) {
        self.id = None;
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.subscribers.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Ok(mut s) = subscribers.lock() {
                s.remove(id);
            }
        }
    }
}

/// Ordered stream of a session's events; ends when the session is destroyed
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    _subscription: Subscription,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = SessionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<SessionEvent>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
