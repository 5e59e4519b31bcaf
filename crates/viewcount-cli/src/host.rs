//! Binds the library crates to a vault directory on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::Value;
use tracing::warn;

use viewcount_core::{LogLevel, Settings};
use viewcount_migrate::{MigrationChain, MigrationOutcome, CURRENT_VERSION};
use viewcount_store::{BlobStore, CounterStore, FsBlobStore, FsMetadataStore};

/// Host config directory, relative to the vault root.
pub const CONFIG_DIR: &str = ".obsidian";

/// Settings record, relative to the config directory.
pub const SETTINGS_FILE: &str = "plugins/view-count/data.json";

pub type VaultStore = CounterStore<FsBlobStore, FsMetadataStore>;

pub struct Host {
    vault: PathBuf,
    config: FsBlobStore,
}

impl Host {
    pub fn new(vault: impl Into<PathBuf>) -> Self {
        let vault = vault.into();
        let config = FsBlobStore::new(vault.join(CONFIG_DIR));
        Self { vault, config }
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    /// The persisted settings record, if one exists.
    pub fn read_settings(&self) -> Result<Option<Value>> {
        if !self.config.exists(SETTINGS_FILE)? {
            return Ok(None);
        }
        let text = self
            .config
            .read(SETTINGS_FILE)
            .context("failed to read settings")?;
        let value = serde_json::from_str(&text).context("settings file is not valid JSON")?;
        Ok(Some(value))
    }

    pub fn write_settings(&mut self, settings: &Settings) -> Result<()> {
        let text = serde_json::to_string_pretty(&settings.to_value()?)?;
        self.config
            .write(SETTINGS_FILE, &text)
            .context("failed to write settings")?;
        Ok(())
    }

    /// The log level recorded in the settings, read before migrating so the
    /// migration itself is logged at the user's level.
    pub fn recorded_log_level(&self) -> Option<LogLevel> {
        let raw = self.read_settings().ok()??;
        raw.get("logLevel")?.as_str()?.parse().ok()
    }

    /// Run the migration chain and persist the resulting settings.
    pub fn migrate(&mut self) -> Result<MigrationOutcome> {
        let raw = self.read_settings()?;
        let mut metadata = FsMetadataStore::new(&self.vault);
        let outcome =
            MigrationChain::new(&mut self.config, &mut metadata, Local).run(raw, CURRENT_VERSION);
        for warning in &outcome.warnings {
            warn!("{warning}");
        }
        if !outcome.complete {
            warn!("migration incomplete, counts are kept in memory until it succeeds");
        }
        self.write_settings(&outcome.settings)?;
        Ok(outcome)
    }

    /// A loaded counter store over this vault.
    ///
    /// After an incomplete migration the store is read-only: the snapshot
    /// and the items' frontmatter may still hold data in an older format.
    pub fn open_store(&self, outcome: &MigrationOutcome) -> VaultStore {
        let mut store = CounterStore::new(
            FsBlobStore::new(self.vault.join(CONFIG_DIR)),
            FsMetadataStore::new(&self.vault),
            outcome.settings.clone(),
        );
        store.set_read_only(!outcome.complete);
        store.load();
        store
    }
}
