use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Explicit database file location. When unset, the store lives in the
    /// per-user data directory (`~/.kestrel/kestrel.db`), created on first use.
    #[serde(default)]
    pub db_path: Option<String>,
    /// Location of an older store file whose settings are worth carrying over.
    /// Checked for existence and size at startup; never required.
    #[serde(default = "default_legacy_db_path")]
    pub legacy_db_path: String,
    /// Budget for the background legacy import. On expiry the worker is
    /// cancelled and startup proceeds without the imported values.
    #[serde(default = "default_import_timeout_secs")]
    pub import_timeout_secs: u64,
    /// Override for the embedded base-schema script. If set but unreadable,
    /// schema application is skipped for the run.
    #[serde(default)]
    pub schema_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            legacy_db_path: default_legacy_db_path(),
            import_timeout_secs: default_import_timeout_secs(),
            schema_path: None,
        }
    }
}

fn default_legacy_db_path() -> String {
    "legacy-store.db".to_string()
}

fn default_import_timeout_secs() -> u64 {
    30
}

fn default_data_dir() -> String {
    "~/.kestrel".to_string()
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

impl StoreConfig {
    /// Resolve the live store location: the configured override if present,
    /// else the per-user data directory. The parent directory is created on
    /// first use.
    pub fn resolve_db_path(&self) -> anyhow::Result<PathBuf> {
        let path = match &self.db_path {
            Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
            None => {
                let dir = PathBuf::from(shellexpand::tilde(&default_data_dir()).into_owned());
                dir.join("kestrel.db")
            }
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    pub fn legacy_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.legacy_db_path).into_owned())
    }

    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_section_defaults_apply() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.legacy_db_path, "legacy-store.db");
        assert_eq!(config.store.import_timeout_secs, 30);
        assert!(config.store.db_path.is_none());
        assert!(config.store.schema_path.is_none());
    }

    #[test]
    fn db_path_override_wins() {
        let config: AppConfig = toml::from_str(
            r#"
            [store]
            db_path = "/tmp/kestrel-test/store.db"
            import_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(
            config.store.db_path.as_deref(),
            Some("/tmp/kestrel-test/store.db")
        );
        assert_eq!(config.store.import_timeout(), Duration::from_secs(5));
    }
}
