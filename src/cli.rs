// CLI configuration for the relay binary

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Single-room message relay server
///
/// Clients POST messages over HTTP, fetch full history with GET, and
/// receive live events over a WebSocket at /ws. Admin keys authorize
/// retroactive deletion.
#[derive(Debug, Parser)]
#[command(name = "chatrelay")]
#[command(about = "Single-room real-time message relay")]
pub struct RelayCli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Path to the message database (created if absent)
    ///
    /// Defaults to relay.db under the state directory.
    #[arg(short, long)]
    pub db: Option<PathBuf>,

    /// Admin key authorized to delete messages (repeatable)
    #[arg(short = 'k', long = "admin-key")]
    pub admin_keys: Vec<String>,

    /// Per-listener outbound queue size before a slow listener is dropped
    #[arg(long, default_value = "64")]
    pub queue_capacity: usize,
}

impl RelayCli {
    /// Parse from command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The state directory holding the default database.
    pub fn state_dir() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".chatrelay")
    }

    /// The database path, explicit or defaulted.
    pub fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("relay.db"))
    }
}
