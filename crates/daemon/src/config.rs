//! Daemon configuration from `TASKLANE_*` environment variables
//!
//! Absent variables fall back to defaults. Present but unparsable ones are
//! rejected so a typo never silently runs with the default.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tasklane_api_rpc::server::{DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use tasklane_api_rpc::RpcServerConfig;
use tasklane_core::QueueConfig;
use tasklane_infra_sqlite::StorePoolConfig;

const ENV_PREFIX: &str = "TASKLANE_";
const DEFAULT_DB_PATH: &str = "~/.tasklane/queue.db";
const DEFAULT_EXPORT_DIR: &str = "~/.tasklane/exports";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format '{}' (expected pretty or json)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub store_max_connections: u32,
    pub rpc: RpcServerConfig,
    pub queue: QueueConfig,
    pub log_format: LogFormat,
    /// Daily-rolling log files are written here when set
    pub log_dir: Option<PathBuf>,
    /// Root for files written by the `export` job
    pub export_dir: PathBuf,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; `lookup` receives full names
    /// such as `TASKLANE_RPC_PORT`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env { lookup: &lookup };
        let defaults = QueueConfig::default();

        let db_path = expand_path(&env.string("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()));
        let log_dir = env.string("LOG_DIR").map(|dir| expand_path(&dir));
        let export_dir = expand_path(
            &env.string("EXPORT_DIR")
                .unwrap_or_else(|| DEFAULT_EXPORT_DIR.to_string()),
        );

        let queue = QueueConfig {
            namespace: env.string("NAMESPACE").unwrap_or(defaults.namespace),
            concurrency: env.parse("CONCURRENCY")?.unwrap_or(defaults.concurrency),
            base_backoff: env.millis("BASE_BACKOFF_MS")?.unwrap_or(defaults.base_backoff),
            max_backoff: env.millis("MAX_BACKOFF_MS")?.unwrap_or(defaults.max_backoff),
            max_fails_default: env.parse("MAX_FAILS")?.unwrap_or(defaults.max_fails_default),
            lease_timeout: env.millis("LEASE_TIMEOUT_MS")?.unwrap_or(defaults.lease_timeout),
            reap_interval: env.millis("REAP_INTERVAL_MS")?.unwrap_or(defaults.reap_interval),
            poll_interval: env.millis("POLL_INTERVAL_MS")?.unwrap_or(defaults.poll_interval),
            error_backoff: defaults.error_backoff,
            shutdown_grace: env.millis("SHUTDOWN_GRACE_MS")?.unwrap_or(defaults.shutdown_grace),
            dead_letter_capacity: env
                .parse("DEAD_LETTER_CAPACITY")?
                .unwrap_or(defaults.dead_letter_capacity),
        };
        queue
            .validate()
            .map_err(|e| anyhow!("invalid queue configuration: {}", e))?;

        let store_max_connections = env
            .parse("STORE_MAX_CONNECTIONS")?
            .unwrap_or(StorePoolConfig::default().max_connections);
        if store_max_connections == 0 {
            return Err(anyhow!("{}STORE_MAX_CONNECTIONS must be at least 1", ENV_PREFIX));
        }

        Ok(Self {
            db_path,
            store_max_connections,
            rpc: RpcServerConfig {
                host: env.string("RPC_HOST").unwrap_or_else(|| DEFAULT_RPC_HOST.to_string()),
                port: env.parse("RPC_PORT")?.unwrap_or(DEFAULT_RPC_PORT),
            },
            queue,
            log_format: env.parse("LOG_FORMAT")?.unwrap_or(LogFormat::Pretty),
            log_dir,
            export_dir,
        })
    }

    pub fn store_pool(&self) -> StorePoolConfig {
        StorePoolConfig {
            max_connections: self.store_max_connections,
            ..StorePoolConfig::for_path(&self.db_path)
        }
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(name)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| anyhow!("{}{}={:?}: {}", ENV_PREFIX, name, raw, e))
            })
            .transpose()
    }

    fn millis(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Make sure the database's parent directory exists
pub fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}
