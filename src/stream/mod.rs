//! Stream connector, session state machine and reconnect supervisor

mod backoff;
mod connector;
mod supervisor;
mod types;

pub use backoff::{ReconnectConfig, ReconnectPolicy};
pub use connector::{CloseHandler, Connector, ConnectorConfig};
pub use supervisor::{Supervisor, SupervisorReport};
pub use types::{CloseReason, ConnectorState, InvalidTransition, Session, SessionStats};
