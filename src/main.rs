// chatrelay server binary

use std::sync::Arc;

use chatrelay::{MessageStore, Relay, RelayCli, RelayServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatrelay=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = RelayCli::parse_args();

    if cli.admin_keys.is_empty() {
        tracing::warn!("no admin keys configured; message deletion is disabled");
    }

    let db_path = cli.db_path();
    let store = MessageStore::open(&db_path)?;
    tracing::info!("message log at {}", db_path.display());

    let relay = Arc::new(Relay::with_queue_capacity(
        store,
        cli.admin_keys.iter().cloned().collect(),
        cli.queue_capacity,
    ));

    let server = RelayServer::bind(cli.bind, relay)?;

    server
        .run_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
}
