// Global configuration structs, one per layer of the node.

use std::path::PathBuf;

// ── Networking ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NetConfig {
    /// UDP port for the QUIC listener. 0 = OS-assigned.
    pub listen_port: u16,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self { listen_port: 0 }
    }
}

// ── Storage ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding shard files (`<digest>.<index>`) and local
    /// distribution manifests. Relative paths resolve against the process
    /// working directory.
    pub shards_dir: PathBuf,

    /// Directory reconstructed files are merged into, named by digest.
    pub dest_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shards_dir: PathBuf::from("shards"),
            dest_dir: PathBuf::from("out"),
        }
    }
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// TCP port for the HTTP listener. `PORT` env var, default 8080.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        Self { port }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_config_defaults() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.shards_dir, PathBuf::from("shards"));
        assert_eq!(cfg.dest_dir, PathBuf::from("out"));
    }

    #[test]
    fn net_config_defaults_to_os_assigned_port() {
        assert_eq!(NetConfig::default().listen_port, 0);
    }
}
