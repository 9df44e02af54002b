mod config;
mod handle;
mod manager;
mod state;
mod subscribers;

pub use config::{ResumeSessionConfig, SessionConfig};
pub use handle::{CopilotSession, DEFAULT_SEND_TIMEOUT};
pub use state::SessionState;
pub use subscribers::{EventStream, Subscription};

pub(crate) use config::SessionHandlers;
pub(crate) use manager::SessionManager;
