//! chatrelay - single-room real-time message relay
//!
//! Clients submit short text messages over HTTP; the server persists
//! them to a durable SQLite log and fans them out to every connected
//! WebSocket listener. History is available in full on (re)connect, and
//! an admin key authorizes retroactive deletion, also fanned out live.

pub mod cli;
pub mod error;
pub mod event;
pub mod handlers;
pub mod hub;
pub mod sanitize;
pub mod server;
pub mod store;

pub use cli::RelayCli;
pub use error::{RelayError, StoreError};
pub use event::{Event, Message};
pub use handlers::Relay;
pub use hub::BroadcastHub;
pub use server::RelayServer;
pub use store::MessageStore;
