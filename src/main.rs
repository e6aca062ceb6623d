use std::error::Error;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod console;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // .env is optional here; variables may come from the shell instead.
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(rag_console::telemetry::layer())
        .init();

    console::run().await?;

    Ok(())
}
