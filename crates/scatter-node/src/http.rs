//! The HTTP front-end — a thin surface over the node façade.
//!
//! `POST /upload` content-addresses the file, answers with the digest, and
//! kicks distribution off asynchronously; `GET /file?hash=<digest>` serves
//! the reconstructed file, triggering reconstruction on a local miss.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use scatter_store::digest::sha256_hex;

use crate::node::Node;

/// Accept uploads up to 1 GiB; bigger files should not travel through a
/// buffered multipart form.
const UPLOAD_LIMIT: usize = 1024 * 1024 * 1024;

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/file", get(get_file))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .with_state(node)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(node: Arc<Node>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP listening");

    axum::serve(listener, router(node))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C — shutting down");
        })
        .await?;
    Ok(())
}

// ── POST /upload ──────────────────────────────────────────────────────────────

async fn upload(State(node): State<Arc<Node>>, mut multipart: Multipart) -> Response {
    let mut bytes: Option<Vec<u8>> = None;

    while let Ok(Some(mut field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let mut data = Vec::new();
        while let Ok(Some(chunk)) = field.chunk().await {
            data.extend_from_slice(&chunk);
        }
        bytes = Some(data);
        break;
    }

    let Some(bytes) = bytes else {
        return (StatusCode::BAD_REQUEST, "multipart field 'file' required").into_response();
    };

    // A zero-byte upload is a legitimate file: it digests, splits into zero
    // shards, and reconstructs to an empty output like any other.
    let digest = sha256_hex(&bytes);

    // The original lives next to the binary, named by its digest.
    if let Err(e) = tokio::fs::write(Path::new(&digest), &bytes).await {
        error!(%digest, %e, "failed to save uploaded file");
        return (StatusCode::INTERNAL_SERVER_ERROR, "unable to save the file").into_response();
    }
    info!(%digest, size = bytes.len(), "file uploaded");

    // Distribution happens after the client already has its digest.
    let background_digest = digest.clone();
    tokio::spawn(async move {
        if let Err(e) = node.distribute_file(Path::new(&background_digest)).await {
            error!(digest = %background_digest, %e, "distribution failed");
        }
    });

    (StatusCode::OK, digest).into_response()
}

// ── GET /file ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FileQuery {
    hash: String,
}

async fn get_file(State(node): State<Arc<Node>>, Query(query): Query<FileQuery>) -> Response {
    let digest = query.hash;
    if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return (StatusCode::BAD_REQUEST, "hash must be a hex digest").into_response();
    }

    let path = node.store().config.dest_dir.join(&digest);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => {
            // Not merged locally yet — pull it out of the network.
            if let Err(e) = node.reconstruct(&digest).await {
                warn!(%digest, %e, "reconstruction failed");
                return (StatusCode::NOT_FOUND, "file not found in network").into_response();
            }
            match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    error!(%digest, %e, "reconstructed file missing on disk");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "error opening file")
                        .into_response();
                }
            }
        }
    };

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={digest}"),
        ),
    ];
    (headers, Body::from_stream(ReaderStream::new(file))).into_response()
}

// ── GET /health ───────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "OK"
}
