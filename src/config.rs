use anyhow::Context;
use std::path::PathBuf;

const DEFAULT_POOL_SIZE: u32 = 8;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_POOL_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
    /// How long a request waits for a free pooled connection.
    pub pool_timeout_ms: u64,
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            pool_timeout_ms: DEFAULT_POOL_TIMEOUT_MS,
            log_filter: None,
        }
    }
}

impl Config {
    /// Reads `GRADEBOOKD_*` variables, after loading a `.env` file if one is present.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(ws) = lookup("GRADEBOOKD_WORKSPACE").filter(|v| !v.trim().is_empty()) {
            cfg.workspace = Some(PathBuf::from(ws.trim()));
        }
        if let Some(raw) = lookup("GRADEBOOKD_POOL_SIZE") {
            let n: u32 = raw
                .trim()
                .parse()
                .with_context(|| format!("GRADEBOOKD_POOL_SIZE must be an integer, got {raw:?}"))?;
            cfg.pool_size = n.max(1);
        }
        if let Some(raw) = lookup("GRADEBOOKD_BUSY_TIMEOUT_MS") {
            cfg.busy_timeout_ms = raw.trim().parse().with_context(|| {
                format!("GRADEBOOKD_BUSY_TIMEOUT_MS must be an integer, got {raw:?}")
            })?;
        }
        if let Some(raw) = lookup("GRADEBOOKD_POOL_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().with_context(|| {
                format!("GRADEBOOKD_POOL_TIMEOUT_MS must be an integer, got {raw:?}")
            })?;
            // r2d2 rejects a zero checkout timeout.
            cfg.pool_timeout_ms = ms.max(1);
        }
        cfg.log_filter = lookup("GRADEBOOKD_LOG").or_else(|| lookup("RUST_LOG"));

        Ok(cfg)
    }
}
