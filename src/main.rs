//! docdispatch - stateless document-collection request handler

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docdispatch::{
    config::Args,
    db::{Connector, MemoryConnector, MongoConnector},
    runtime, server, Dispatcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_tracing(&args);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("docdispatch {}", env!("CARGO_PKG_VERSION"));
    info!("Variant: {}", args.variant);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });

    let connector: Arc<dyn Connector> = match args.target() {
        Some(target) if !args.dev_mode => {
            info!("MongoDB: {}:{} db={} collection={}", target.host, target.port, target.database, target.collection);
            Arc::new(MongoConnector::new(target))
        }
        _ => {
            warn!("Development mode enabled - documents are kept in memory");
            Arc::new(MemoryConnector::new())
        }
    };

    let dispatcher = Dispatcher::new(connector);

    match args.listen {
        Some(listen) => server::run(dispatcher, args.variant, listen).await?,
        None => runtime::run(dispatcher, args.variant)
            .await
            .map_err(|e| anyhow::anyhow!("Function runtime error: {}", e))?,
    }

    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("docdispatch={},info", args.log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
