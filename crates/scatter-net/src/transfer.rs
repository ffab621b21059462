//! The shard-transfer wire protocol.
//!
//! One bidirectional stream per request, negotiated as
//! `/scatter/shard-xfer/1`. The header is a single ASCII line, the body is
//! opaque bytes running until stream close:
//!
//! ```text
//! GET <shardName>\n            →  OK\n<bytes…>   |  NOT FOUND\n
//! MAX_INDEX <digest>\n         →  OK\n<int>\n    |  NOT FOUND\n
//! SHARD <shardName>\n<bytes…>     (fire-and-forget upload, no response)
//! ```
//!
//! A first line that is not a known verb is treated as a legacy bare-filename
//! shard upload, matching the historic on-wire behaviour.

use std::io;
use std::time::Duration;

use futures::io::BufReader;
use futures::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::StreamProtocol;

/// Protocol identifier negotiated during substream opening.
pub const TRANSFER_PROTOCOL: StreamProtocol = StreamProtocol::new("/scatter/shard-xfer/1");

/// Hard timeout on stream establishment. Transfers themselves run until
/// completion or failure.
pub const ESTABLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Header lines never legitimately exceed a digest plus a decimal index;
/// anything longer is a malformed or hostile peer.
const MAX_HEADER_BYTES: usize = 1024;

pub const VERB_GET: &str = "GET";
pub const VERB_MAX_INDEX: &str = "MAX_INDEX";
pub const VERB_SHARD: &str = "SHARD";

const STATUS_OK: &str = "OK";
const STATUS_NOT_FOUND: &str = "NOT FOUND";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed header or unexpected response. The stream is abandoned;
    /// there is no retry within a stream.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer answered `NOT FOUND`.
    #[error("peer does not have the requested item")]
    NotFound,

    /// The stream could not be established at all.
    #[error("transport error: {0}")]
    Transport(String),
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// A parsed request header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `GET <shardName>` — download one shard.
    Get(String),
    /// `MAX_INDEX <digest>` — highest shard index the peer holds.
    MaxIndex(String),
    /// `SHARD <shardName>` — inbound shard upload, body follows.
    Push(String),
    /// Bare-filename upload from a peer speaking the legacy framing.
    LegacyPush(String),
}

impl Request {
    /// Parse a header line: split on the first space into verb and payload.
    /// Unknown verbs fall back to the legacy whole-line-is-a-filename form.
    pub fn parse(line: &str) -> Self {
        match line.split_once(' ') {
            Some((VERB_GET, payload)) => Request::Get(payload.to_string()),
            Some((VERB_MAX_INDEX, payload)) => Request::MaxIndex(payload.to_string()),
            Some((VERB_SHARD, payload)) => Request::Push(payload.to_string()),
            _ => Request::LegacyPush(line.to_string()),
        }
    }

    /// Encode the header line, trailing newline included.
    pub fn header(&self) -> String {
        match self {
            Request::Get(name) => format!("{VERB_GET} {name}\n"),
            Request::MaxIndex(digest) => format!("{VERB_MAX_INDEX} {digest}\n"),
            Request::Push(name) => format!("{VERB_SHARD} {name}\n"),
            Request::LegacyPush(name) => format!("{name}\n"),
        }
    }
}

// ── Line and status framing ───────────────────────────────────────────────────

/// Read one `\n`-terminated header line, capped at [`MAX_HEADER_BYTES`].
/// The terminator (and an optional preceding `\r`) is stripped.
pub async fn read_header_line<R>(reader: &mut BufReader<R>) -> Result<String, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = (&mut *reader).take(MAX_HEADER_BYTES as u64 + 1);
    limited.read_until(b'\n', &mut buf).await?;

    if buf.last() != Some(&b'\n') {
        if buf.len() > MAX_HEADER_BYTES {
            return Err(TransferError::Protocol("header line too long".into()));
        }
        return Err(TransferError::Protocol(
            "stream ended before header terminator".into(),
        ));
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|_| TransferError::Protocol("header is not UTF-8".into()))
}

/// Response status line of a `GET` or `MAX_INDEX` exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
}

pub async fn read_status<R>(reader: &mut BufReader<R>) -> Result<Status, TransferError>
where
    R: AsyncRead + Unpin,
{
    let line = read_header_line(reader).await?;
    match line.as_str() {
        STATUS_OK => Ok(Status::Ok),
        STATUS_NOT_FOUND => Ok(Status::NotFound),
        other => Err(TransferError::Protocol(format!(
            "unexpected status line: {other:?}"
        ))),
    }
}

pub async fn write_ok<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(format!("{STATUS_OK}\n").as_bytes()).await
}

pub async fn write_not_found<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{STATUS_NOT_FOUND}\n").as_bytes())
        .await
}

// ── Client operations ─────────────────────────────────────────────────────────
//
// Each takes ownership of a freshly opened stream; the stream is consumed
// whether the exchange succeeds or not.

/// `GET <name>` — returns the shard bytes, or [`TransferError::NotFound`]
/// when the peer does not hold the shard.
pub async fn fetch_shard<S>(mut stream: S, name: &str) -> Result<Vec<u8>, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(Request::Get(name.to_string()).header().as_bytes())
        .await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    match read_status(&mut reader).await? {
        Status::NotFound => Err(TransferError::NotFound),
        Status::Ok => {
            let mut body = Vec::new();
            reader.read_to_end(&mut body).await?;
            Ok(body)
        }
    }
}

/// `MAX_INDEX <digest>` — returns the highest shard index the peer holds
/// for the digest, or [`TransferError::NotFound`].
pub async fn fetch_max_index<S>(mut stream: S, digest: &str) -> Result<u64, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(Request::MaxIndex(digest.to_string()).header().as_bytes())
        .await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    match read_status(&mut reader).await? {
        Status::NotFound => Err(TransferError::NotFound),
        Status::Ok => {
            let line = read_header_line(&mut reader).await?;
            line.trim()
                .parse::<u64>()
                .map_err(|_| TransferError::Protocol(format!("bad max index reply: {line:?}")))
        }
    }
}

/// `SHARD <name>` + body — fire-and-forget upload. The stream is closed
/// once the body is written; no response is read.
pub async fn push_shard<S>(mut stream: S, name: &str, data: &[u8]) -> Result<(), TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(Request::Push(name.to_string()).header().as_bytes())
        .await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    stream.close().await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;
    use tokio_util::compat::TokioAsyncReadCompatExt;

    #[test]
    fn parses_all_verbs() {
        assert_eq!(
            Request::parse("GET cafe.0"),
            Request::Get("cafe.0".into())
        );
        assert_eq!(
            Request::parse("MAX_INDEX cafe"),
            Request::MaxIndex("cafe".into())
        );
        assert_eq!(
            Request::parse("SHARD cafe.2"),
            Request::Push("cafe.2".into())
        );
    }

    #[test]
    fn unknown_verb_is_a_legacy_upload() {
        assert_eq!(
            Request::parse("cafe.1"),
            Request::LegacyPush("cafe.1".into())
        );
        // Verbs are case-sensitive.
        assert_eq!(
            Request::parse("get cafe.0"),
            Request::LegacyPush("get cafe.0".into())
        );
    }

    #[test]
    fn split_is_on_first_space_only() {
        assert_eq!(
            Request::parse("GET a name with spaces"),
            Request::Get("a name with spaces".into())
        );
    }

    #[test]
    fn header_round_trip() {
        for req in [
            Request::Get("d.0".into()),
            Request::MaxIndex("d".into()),
            Request::Push("d.3".into()),
        ] {
            let header = req.header();
            assert!(header.ends_with('\n'));
            assert_eq!(Request::parse(header.trim_end()), req);
        }
    }

    #[tokio::test]
    async fn reads_lines_and_statuses() {
        let mut reader = BufReader::new(Cursor::new(b"OK\n42\n".to_vec()));
        assert_eq!(read_status(&mut reader).await.unwrap(), Status::Ok);
        assert_eq!(read_header_line(&mut reader).await.unwrap(), "42");

        let mut reader = BufReader::new(Cursor::new(b"NOT FOUND\n".to_vec()));
        assert_eq!(read_status(&mut reader).await.unwrap(), Status::NotFound);
    }

    #[tokio::test]
    async fn garbage_status_is_a_protocol_error() {
        let mut reader = BufReader::new(Cursor::new(b"MAYBE\n".to_vec()));
        assert!(matches!(
            read_status(&mut reader).await,
            Err(TransferError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn oversized_header_is_rejected() {
        let mut line = vec![b'a'; 4096];
        line.push(b'\n');
        let mut reader = BufReader::new(Cursor::new(line));
        assert!(matches!(
            read_header_line(&mut reader).await,
            Err(TransferError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn unterminated_header_is_rejected() {
        let mut reader = BufReader::new(Cursor::new(b"GET cafe.0".to_vec()));
        assert!(matches!(
            read_header_line(&mut reader).await,
            Err(TransferError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn push_shard_frames_header_then_body() {
        let mut buf = Cursor::new(Vec::new());
        push_shard(&mut buf, "cafe.1", &[0xAB; 16]).await.unwrap();
        let written = buf.into_inner();
        assert!(written.starts_with(b"SHARD cafe.1\n"));
        assert_eq!(&written[b"SHARD cafe.1\n".len()..], &[0xAB; 16]);
    }

    #[tokio::test]
    async fn fetch_shard_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(64 * 1024);

        let server_task = tokio::spawn(async move {
            let mut server = server.compat();
            let mut reader = BufReader::new(&mut server);
            let line = read_header_line(&mut reader).await.unwrap();
            assert_eq!(Request::parse(&line), Request::Get("cafe.0".into()));
            drop(reader);
            write_ok(&mut server).await.unwrap();
            server.write_all(&[0x5A; 300]).await.unwrap();
            server.close().await.unwrap();
        });

        let body = fetch_shard(client.compat(), "cafe.0").await.unwrap();
        assert_eq!(body, vec![0x5A; 300]);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn fetch_max_index_not_found() {
        let (client, server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            let mut server = server.compat();
            let mut reader = BufReader::new(&mut server);
            let _ = read_header_line(&mut reader).await.unwrap();
            drop(reader);
            write_not_found(&mut server).await.unwrap();
            server.close().await.unwrap();
        });

        let err = fetch_max_index(client.compat(), "cafe").await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound));
        server_task.await.unwrap();
    }
}
