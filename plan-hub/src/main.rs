use anyhow::Result;
use clap::Parser;
use plan_hub::{api, config::Cli};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let service = cli.build_service().await?;

    let mut events = service.events().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(?event, "node event"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = api::router(service);
    let listener = TcpListener::bind(cli.addr.as_str()).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
