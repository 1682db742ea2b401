use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub upload_dir: PathBuf,
    /// External base used to build download links, without trailing slash
    pub public_url: String,
    pub sweep_interval: Duration,
    pub max_upload_bytes: u64,
    /// Static UI directory served for unmatched routes
    pub public_path: Option<PathBuf>,
    pub reconcile_on_start: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads"));

        let public_url = lookup("PUBLIC_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        let sweep_interval = lookup("SWEEP_INTERVAL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let public_path = lookup("PUBLIC_PATH").map(PathBuf::from);

        let reconcile_on_start = lookup("RECONCILE_ON_START")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            port,
            upload_dir,
            public_url,
            sweep_interval,
            max_upload_bytes,
            public_path,
            reconcile_on_start,
        }
    }

    /// Where in-flight uploads are written before the store takes them.
    /// Inside the upload directory so the final move is a same-filesystem rename.
    pub fn staging_dir(&self) -> PathBuf {
        self.upload_dir.join(".staging")
    }
}
