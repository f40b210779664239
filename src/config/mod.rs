use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration for upload persistence
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory for stored upload copies (default: system temp dir)
    pub temp_dir: Option<PathBuf>,

    /// Unix mode applied to stored copies, e.g. 0o600 (default: none)
    pub file_permissions: Option<u32>,

    /// Maximum accepted size of a single file in bytes (default: 32 MB)
    pub max_file_size: usize,

    /// Name of the cookie carrying the session id (default: "upload_session")
    pub session_cookie: String,

    /// Idle time after which a session and its stored files are dropped (default: 2h)
    pub session_ttl_secs: u64,

    /// Interval of the expired-session sweep (default: 5 min)
    pub sweep_interval_secs: u64,

    /// Listen address (default: 127.0.0.1:3000)
    pub bind_addr: SocketAddr,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            file_permissions: None,
            max_file_size: 32 * 1024 * 1024, // 32 MB
            session_cookie: "upload_session".to_string(),
            session_ttl_secs: 2 * 60 * 60,
            sweep_interval_secs: 5 * 60,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl StorageConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            temp_dir: env::var("UPLOAD_TEMP_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .or(default.temp_dir),

            file_permissions: env::var("UPLOAD_FILE_MODE")
                .ok()
                .and_then(|v| parse_mode(&v))
                .or(default.file_permissions),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            session_cookie: env::var("SESSION_COOKIE").unwrap_or(default.session_cookie),

            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.session_ttl_secs),

            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.sweep_interval_secs),

            bind_addr: env::var("BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.bind_addr),
        }
    }

    /// Create config for development (short sessions, frequent sweeps)
    pub fn development() -> Self {
        Self {
            session_ttl_secs: 15 * 60,
            sweep_interval_secs: 30,
            ..Self::default()
        }
    }

    /// Directory stored copies are written to
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(env::temp_dir)
    }
}

/// Parses an octal file mode such as "600" or "0o640".
fn parse_mode(raw: &str) -> Option<u32> {
    let digits = raw.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8).ok().filter(|m| *m <= 0o7777)
}
