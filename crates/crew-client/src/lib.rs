pub mod backoff;
pub mod commands;
pub mod config;
pub mod connection;
pub mod session;

pub use backoff::ReconnectPolicy;
pub use commands::{CommandClient, CommandError};
pub use config::{derive_ws_url, ClientConfig, ConfigError, ConnectionConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use session::{ControlError, Session, SessionState};
