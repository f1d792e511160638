use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tally_ledger::LedgerConfig;
use tally_server::ServerConfig;
use tally_store::{
    AccountStore, InMemoryAccountStore, JournalAccountStore, JournalConfig, SledAccountStore,
    SyncMode, DEFAULT_COMPACT_AFTER_FRAMES,
};

/// Which [`AccountStore`] adapter backs the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Nothing persists past the process.
    Memory,
    /// Append-only CRC-framed file.
    Journal,
    /// sled key-value database directory.
    Sled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// Journal file or sled directory. Ignored for `memory`.
    pub path: PathBuf,
    pub sync_mode: SyncMode,
    /// Journal only: compact on startup past this many frames, `0` never.
    pub compact_after_frames: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Journal,
            path: PathBuf::from("tally.journal"),
            sync_mode: SyncMode::default(),
            compact_after_frames: DEFAULT_COMPACT_AFTER_FRAMES,
        }
    }
}

impl StorageConfig {
    pub fn open(&self) -> anyhow::Result<Arc<dyn AccountStore>> {
        let store: Arc<dyn AccountStore> = match self.backend {
            Backend::Memory => Arc::new(InMemoryAccountStore::new()),
            Backend::Journal => {
                let config = JournalConfig {
                    sync_mode: self.sync_mode,
                    compact_after_frames: self.compact_after_frames,
                };
                Arc::new(
                    JournalAccountStore::open(&self.path, config)
                        .with_context(|| format!("opening journal {}", self.path.display()))?,
                )
            }
            Backend::Sled => Arc::new(
                SledAccountStore::open(&self.path)
                    .with_context(|| format!("opening sled database {}", self.path.display()))?,
            ),
        };
        tracing::debug!(backend = store.backend_name(), path = %self.path.display(), "store opened");
        Ok(store)
    }
}

/// Everything `tally` reads from its TOML configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`. Defaults to `info`.
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub server: ServerConfig,
}

impl TallyConfig {
    /// Read `path`, or fall back to defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.ledger.validate()?;
        Ok(config)
    }

    pub fn log_level(&self) -> anyhow::Result<tracing::Level> {
        match &self.log_level {
            Some(level) => tracing::Level::from_str(level)
                .map_err(|_| anyhow::anyhow!("unknown log level {level:?}")),
            None => Ok(tracing::Level::INFO),
        }
    }
}
