//! Runtime settings for the `course` binary.
//!
//! Sources, lowest to highest precedence: built-in defaults, an optional TOML
//! file, environment variables (a `.env` file is loaded first), CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use course_core::model::{AdvancePolicy, LearnerId};
use serde::Deserialize;
use services::{RetryPolicy, StoreSettings};
use storage::remote::RemoteConfig;

use crate::db::normalize_sqlite_url;

pub const DEFAULT_DB_URL: &str = "sqlite://course.sqlite3";
pub const DEFAULT_CATALOG: &str = "data/sql-course.json";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;

pub const ENV_DB_URL: &str = "COURSE_DB_URL";
pub const ENV_CATALOG: &str = "COURSE_CATALOG";
pub const ENV_LEARNER_ID: &str = "COURSE_LEARNER_ID";
pub const ENV_REMOTE_URL: &str = "COURSE_REMOTE_URL";
pub const ENV_REMOTE_TOKEN: &str = "COURSE_REMOTE_TOKEN";

//
// ─── FILE ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database_url: Option<String>,
    pub catalog: Option<PathBuf>,
    pub learner_id: Option<String>,
    pub advance: Option<AdvancePolicy>,
    pub max_conflict_retries: Option<u32>,
    pub retry: RetrySection,
    pub remote: Option<RemoteSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub jitter: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSection {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

//
// ─── RESOLVED ──────────────────────────────────────────────────────────────────
//

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub db_url: Option<String>,
    pub catalog: Option<PathBuf>,
    pub learner: Option<String>,
    pub remote_url: Option<String>,
    pub advance: Option<AdvancePolicy>,
}

#[derive(Debug, Clone)]
pub enum Backend {
    Sqlite { url: String },
    Remote(RemoteConfig),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub catalog: PathBuf,
    pub learner: Option<LearnerId>,
    pub store: StoreSettings,
}

impl Settings {
    /// Layer `file`, then `env`, then `cli` over the defaults.
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
        cli: Overrides,
    ) -> anyhow::Result<Self> {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let remote = file.remote.unwrap_or_default();
        let remote_url = cli
            .remote_url
            .or_else(|| non_empty(ENV_REMOTE_URL))
            .or(remote.base_url);

        let backend = match remote_url {
            Some(base_url) => {
                let mut config = RemoteConfig::new(base_url).with_timeout(Duration::from_secs(
                    remote.timeout_secs.unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
                ));
                if let Some(token) = non_empty(ENV_REMOTE_TOKEN).or(remote.token) {
                    config = config.with_token(token);
                }
                Backend::Remote(config)
            }
            None => {
                let raw = cli
                    .db_url
                    .or_else(|| non_empty(ENV_DB_URL))
                    .or(file.database_url)
                    .unwrap_or_else(|| DEFAULT_DB_URL.to_string());
                Backend::Sqlite {
                    url: normalize_sqlite_url(&raw),
                }
            }
        };

        let catalog = cli
            .catalog
            .or_else(|| non_empty(ENV_CATALOG).map(PathBuf::from))
            .or(file.catalog)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG));

        let learner = cli
            .learner
            .or_else(|| non_empty(ENV_LEARNER_ID))
            .or(file.learner_id)
            .map(|raw| {
                raw.parse::<LearnerId>()
                    .with_context(|| format!("invalid learner id: {raw}"))
            })
            .transpose()?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: file.retry.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: file
                .retry
                .base_delay_ms
                .map_or(defaults.base_delay, Duration::from_millis),
            max_delay: file
                .retry
                .max_delay_ms
                .map_or(defaults.max_delay, Duration::from_millis),
            jitter: file.retry.jitter.unwrap_or(defaults.jitter),
        };

        let store = StoreSettings {
            advance: cli.advance.or(file.advance).unwrap_or_default(),
            retry,
            max_conflict_retries: file
                .max_conflict_retries
                .unwrap_or(StoreSettings::default().max_conflict_retries),
        };

        Ok(Self {
            backend,
            catalog,
            learner,
            store,
        })
    }
}
