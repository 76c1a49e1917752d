//! Real-time client core for the arena: a STOMP-over-WebSocket transport that
//! reconnects and resubscribes on its own, a server clock estimator, an event
//! dispatcher feeding the room, game and chat stores, and a REST client.

pub mod client;
pub mod config;
pub mod connection_state;
pub mod dispatcher;
pub mod logic;
pub mod rest;
pub mod session;
pub mod stores;
pub mod tokens;

pub use arena_shared as shared;
pub use async_handle::Handle;
pub use client::Client;
pub use config::{ClientConfig, ConfigError};
pub use connection_state::ConnectionState;
pub use dispatcher::{Dispatcher, GameScope, Notice, RoomScope};
pub use logic::{BearerLogic, ClientLogic, ConnectError};
pub use rest::{ApiError, ForcedLogout, RestClient};
pub use session::Session;
pub use tokens::{FileTokenStore, MemoryTokenStore, TokenError, TokenStore};
