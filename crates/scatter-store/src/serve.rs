//! Inbound shard-transfer stream handler.
//!
//! Every inbound stream runs in its own task: read one header line,
//! dispatch on the verb, answer, close. Uploads are dual-mode — both the
//! `SHARD <name>` verb and the legacy bare-filename first line are
//! accepted, matching the historic on-wire behaviour.

use std::sync::Arc;

use futures::io::BufReader;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use scatter_net::transfer::{read_header_line, write_not_found, write_ok};
use scatter_net::{PeerId, Request};
use scatter_types::{parse_shard_name, Shard};

use crate::ScatterStore;

/// Handle one inbound stream from `peer`. The stream is closed on every
/// exit path; failures are logged, never propagated — a misbehaving peer
/// must not take the node down.
pub async fn handle_stream<S>(store: Arc<ScatterStore>, peer: PeerId, stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);

    let line = match read_header_line(&mut reader).await {
        Ok(line) => line,
        Err(e) => {
            warn!(%peer, %e, "unreadable request header");
            return;
        }
    };

    let request = Request::parse(&line);
    debug!(%peer, ?request, "inbound request");

    match request {
        Request::Get(name) => respond_get(&store, &mut reader, &name).await,
        Request::MaxIndex(digest) => respond_max_index(&store, &mut reader, &digest).await,
        Request::Push(name) | Request::LegacyPush(name) => {
            receive_shard(&store, &mut reader, &name, &peer).await
        }
    }

    let mut stream = reader.into_inner();
    if let Err(e) = stream.close().await {
        debug!(%peer, %e, "error closing inbound stream");
    }
}

/// A shard name from the wire must stay inside the shards directory.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && name != "." && name != ".."
}

// ── GET ───────────────────────────────────────────────────────────────────────

async fn respond_get<S>(store: &ScatterStore, reader: &mut BufReader<S>, name: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let writer = reader.get_mut();

    if !is_safe_name(name) {
        warn!(name, "rejecting GET for unsafe shard name");
        let _ = write_not_found(writer).await;
        return;
    }

    let data = match tokio::fs::read(store.config.shards_dir.join(name)).await {
        Ok(data) => data,
        Err(_) => {
            debug!(name, "shard not held here");
            let _ = write_not_found(writer).await;
            return;
        }
    };

    if let Err(e) = async {
        write_ok(writer).await?;
        writer.write_all(&data).await?;
        writer.flush().await
    }
    .await
    {
        warn!(name, %e, "error streaming shard");
    }
}

// ── MAX_INDEX ─────────────────────────────────────────────────────────────────

async fn respond_max_index<S>(store: &ScatterStore, reader: &mut BufReader<S>, digest: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let writer = reader.get_mut();

    match store.catalogue.max_index(digest) {
        None => {
            debug!(%digest, "no shards catalogued for digest");
            let _ = write_not_found(writer).await;
        }
        Some(max) => {
            if let Err(e) = async {
                write_ok(writer).await?;
                writer.write_all(format!("{max}\n").as_bytes()).await?;
                writer.flush().await
            }
            .await
            {
                warn!(%digest, %e, "error sending max index");
            }
        }
    }
}

// ── SHARD upload (verbed and legacy) ──────────────────────────────────────────

async fn receive_shard<S>(store: &ScatterStore, reader: &mut BufReader<S>, name: &str, peer: &PeerId)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !is_safe_name(name) {
        warn!(%peer, name, "rejecting upload with unsafe filename");
        return;
    }

    if let Err(e) = tokio::fs::create_dir_all(&store.config.shards_dir).await {
        warn!(%e, "cannot create shards directory");
        return;
    }

    let mut body = Vec::new();
    if let Err(e) = reader.read_to_end(&mut body).await {
        warn!(%peer, name, %e, "error reading upload body");
        return;
    }

    let path = store.config.shards_dir.join(name);
    if let Err(e) = tokio::fs::write(&path, &body).await {
        warn!(name, %e, "error writing received shard");
        return;
    }
    let size = body.len() as u64;

    match parse_shard_name(name) {
        Ok((digest, index)) => {
            store.catalogue.init_if_absent(digest);
            let inserted = store.catalogue.insert(
                digest,
                Shard {
                    index,
                    name: name.to_string(),
                    size,
                },
            );
            if !inserted {
                debug!(name, "duplicate shard receipt — keeping first record");
            }
            info!(%peer, name, size, "shard received");
        }
        Err(e) => {
            // Not shard-shaped: accepted as a plain file, no catalogue entry.
            info!(%peer, name, size, %e, "plain file received");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use scatter_net::{fetch_max_index, fetch_shard, push_shard, TransferError};
    use scatter_types::config::StoreConfig;
    use tokio_util::compat::TokioAsyncReadCompatExt;

    fn store_in(dir: &std::path::Path) -> Arc<ScatterStore> {
        Arc::new(
            ScatterStore::new(StoreConfig {
                shards_dir: dir.join("shards"),
                dest_dir: dir.join("out"),
            })
            .unwrap(),
        )
    }

    fn spawn_handler(
        store: Arc<ScatterStore>,
        server: tokio::io::DuplexStream,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(handle_stream(store, PeerId::random(), server.compat()))
    }

    #[tokio::test]
    async fn get_serves_a_held_shard() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        tokio::fs::write(store.config.shards_dir.join("cafe.0"), [0xEE; 2048])
            .await
            .unwrap();

        let (client, server) = tokio::io::duplex(64 * 1024);
        let handler = spawn_handler(store, server);

        let body = fetch_shard(client.compat(), "cafe.0").await.unwrap();
        assert_eq!(body, vec![0xEE; 2048]);
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn get_for_a_missing_shard_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let (client, server) = tokio::io::duplex(4096);
        let handler = spawn_handler(store, server);

        let err = fetch_shard(client.compat(), "cafe.9").await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound));
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn get_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let (client, server) = tokio::io::duplex(4096);
        let handler = spawn_handler(store, server);

        let err = fetch_shard(client.compat(), "../secret").await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound));
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn max_index_reflects_the_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.catalogue.insert("cafe", Shard::new("cafe", 0, 1));
        store.catalogue.insert("cafe", Shard::new("cafe", 4, 1));

        let (client, server) = tokio::io::duplex(4096);
        let handler = spawn_handler(store, server);

        assert_eq!(fetch_max_index(client.compat(), "cafe").await.unwrap(), 4);
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn max_index_for_unknown_digest_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let (client, server) = tokio::io::duplex(4096);
        let handler = spawn_handler(store, server);

        let err = fetch_max_index(client.compat(), "beef").await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound));
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn shard_push_lands_on_disk_and_in_the_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let (client, server) = tokio::io::duplex(64 * 1024);
        let handler = spawn_handler(Arc::clone(&store), server);

        push_shard(client.compat(), "cafe.1", &[9u8; 500]).await.unwrap();
        handler.await.unwrap();

        let on_disk = tokio::fs::read(store.config.shards_dir.join("cafe.1"))
            .await
            .unwrap();
        assert_eq!(on_disk, vec![9u8; 500]);

        let snap = store.catalogue.snapshot("cafe");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].index, 1);
        assert_eq!(snap[0].size, 500);
    }

    #[tokio::test]
    async fn legacy_bare_filename_upload_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let (client, server) = tokio::io::duplex(4096);
        let handler = spawn_handler(Arc::clone(&store), server);

        let mut client = client.compat();
        client.write_all(b"cafe.7\n").await.unwrap();
        client.write_all(&[1u8; 64]).await.unwrap();
        client.close().await.unwrap();
        handler.await.unwrap();

        assert!(store.config.shards_dir.join("cafe.7").exists());
        assert!(store.catalogue.has_index("cafe", 7));
    }

    #[tokio::test]
    async fn non_shard_filename_is_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let (client, server) = tokio::io::duplex(4096);
        let handler = spawn_handler(Arc::clone(&store), server);

        push_shard(client.compat(), "notes.txt", b"hello").await.unwrap();
        handler.await.unwrap();

        assert!(store.config.shards_dir.join("notes.txt").exists());
        assert_eq!(store.catalogue.max_index("notes"), None);
    }

    #[tokio::test]
    async fn unsafe_upload_name_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let (client, server) = tokio::io::duplex(4096);
        let handler = spawn_handler(Arc::clone(&store), server);

        // The handler may drop the stream before the body is flushed; the
        // push outcome is irrelevant here.
        let _ = push_shard(client.compat(), "../evil.0", b"payload").await;
        handler.await.unwrap();

        assert!(!dir.path().join("evil.0").exists());
    }
}
