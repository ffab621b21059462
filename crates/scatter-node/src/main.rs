//! Scatter node binary.
//!
//! ```bash
//! # First node
//! RUST_LOG=info PORT=8080 cargo run --bin scatter-node
//!
//! # Second node on the same LAN
//! RUST_LOG=info PORT=8081 cargo run --bin scatter-node
//!
//! # Upload a file (the response body is its digest)
//! curl -F file=@big.bin http://localhost:8080/upload
//!
//! # Fetch it back from any node
//! curl -o big.bin http://localhost:8081/file?hash=<digest>
//! ```

mod http;
mod node;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use scatter_types::config::{HttpConfig, NetConfig, StoreConfig};

use crate::node::Node;

#[derive(Parser)]
#[command(
    name = "scatter-node",
    version = env!("CARGO_PKG_VERSION"),
    about = "Peer-to-peer file distribution over the local network"
)]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // No flags — configuration comes from the environment (`PORT`).
    let _cli = Cli::parse();

    let node = Arc::new(Node::start(NetConfig::default(), StoreConfig::default()).await?);
    let http_config = HttpConfig::default();

    http::serve(Arc::clone(&node), http_config.port).await?;

    node.shutdown().await
}
