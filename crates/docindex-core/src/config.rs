//! Layered settings loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nesting levels, e.g. `APP_STORAGE__INDEX_ROOT`).
//! `AZURE_SEARCH_INDEX_NAME` overrides the conversation index name.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunking::ChunkingConfig;
use crate::error::{IndexError, Result};
use crate::schema::SchemaRegistry;

/// What the provisioner does when fetching an index descriptor fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPolicy {
    /// Any fetch failure leads to a create attempt.
    #[default]
    CreateOnAnyFetchError,
    /// Only a not-found fetch leads to a create attempt; other errors are returned.
    CreateOnNotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub conversation: String,
    pub library: String,
    pub provision_policy: ProvisionPolicy,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            conversation: "chat-documents".to_string(),
            library: "library-documents".to_string(),
            provision_policy: ProvisionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub index_root: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { index_root: "./data/indexes".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub storage: StorageSettings,
    pub chunking: ChunkingConfig,
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let settings: Settings = Self::figment(env_name)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load settings for '{}': {}", env_name, e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn figment(env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment
            .merge(Env::prefixed("APP_").split("__"))
            .merge(Env::raw().only(&["AZURE_SEARCH_INDEX_NAME"]).map(|_| "index.conversation".into()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.index.conversation.trim().is_empty() || self.index.library.trim().is_empty() {
            return Err(IndexError::InvalidConfig("index names must not be empty".to_string()));
        }
        if self.index.conversation == self.index.library {
            return Err(IndexError::InvalidConfig(format!(
                "conversation and library indexes must differ, both are '{}'",
                self.index.conversation
            )));
        }
        if !(0.0..1.0).contains(&self.chunking.overlap_percent) {
            return Err(IndexError::InvalidConfig(format!(
                "chunking.overlap_percent must be in [0, 1), got {}",
                self.chunking.overlap_percent
            )));
        }
        if self.chunking.max_tokens == 0 {
            return Err(IndexError::InvalidConfig("chunking.max_tokens must be positive".to_string()));
        }
        Ok(())
    }

    pub fn registry(&self) -> Result<SchemaRegistry> {
        SchemaRegistry::with_defaults(&self.index.conversation, &self.index.library)
    }

    /// The index root after `~`/`$VAR` expansion, resolved against `base`.
    pub fn index_root(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.storage.index_root)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_apply_without_files() {
        Jail::expect_with(|_jail| {
            let settings = Settings::load_for_env("dev").expect("load");
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn env_file_and_variables_layer_in_order() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[index]\nconversation = \"base\"\n[storage]\nindex_root = \"/srv/idx\"")?;
            jail.create_file("config.prod.toml", "[index]\nprovision_policy = \"create_on_not_found\"")?;
            jail.set_env("APP_CHUNKING__MAX_TOKENS", "64");
            let settings = Settings::load_for_env("prod").expect("load");
            assert_eq!(settings.index.conversation, "base");
            assert_eq!(settings.index.provision_policy, ProvisionPolicy::CreateOnNotFound);
            assert_eq!(settings.chunking.max_tokens, 64);
            assert_eq!(settings.index_root(Path::new("/tmp")), PathBuf::from("/srv/idx"));
            Ok(())
        });
    }

    #[test]
    fn azure_index_name_overrides_conversation_index() {
        Jail::expect_with(|jail| {
            jail.set_env("AZURE_SEARCH_INDEX_NAME", "from-env");
            let settings = Settings::load_for_env("test").expect("load");
            assert_eq!(settings.index.conversation, "from-env");
            Ok(())
        });
    }

    #[test]
    fn identical_index_names_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_INDEX__CONVERSATION", "same");
            jail.set_env("APP_INDEX__LIBRARY", "same");
            assert!(Settings::load_for_env("dev").is_err());
            Ok(())
        });
    }

    #[test]
    fn relative_root_resolves_against_base() {
        let settings = Settings::default();
        assert_eq!(settings.index_root(Path::new("/work")), PathBuf::from("/work/./data/indexes"));
    }
}
