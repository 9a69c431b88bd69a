//! Configuration loader using figment.
//!
//! Sources, lowest to highest priority:
//!
//! 1. Built-in defaults
//! 2. Profile-specific file (`ovation.{profile}.toml`)
//! 3. Main file (`ovation.toml`)
//! 4. Environment variables (`OVATION_*`, `__` as nesting separator)
//! 5. Programmatic overrides
//!
//! `OVATION_SERVER__PORT=9000` maps to `server.port = 9000`, and so on.
//! Search paths are the current directory plus the user config directory
//! (`~/.config/ovation` on Linux).

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use tracing::debug;

use super::error::{ConfigError, ConfigResult};
use super::schema::OvationConfig;

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Reads `OVATION_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("OVATION_PROFILE")
            .map(|p| match p.to_lowercase().as_str() {
                "production" | "prod" => Self::Production,
                "development" | "dev" => Self::Development,
                other => Self::Custom(other.to_string()),
            })
            .unwrap_or_default()
    }
}

/// Multi-source configuration loader.
///
/// ```rust,ignore
/// let config = ConfigLoader::new()
///     .file("config/ovation.toml")
///     .profile("production")
///     .load()?;
/// ```
pub struct ConfigLoader {
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
    overrides: Option<OvationConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from(".")];
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("ovation"));
        }
        Self {
            profile: Profile::from_env(),
            search_paths,
            load_env: true,
            config_file: None,
            overrides: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        let name = profile.into();
        self.profile = match name.as_str() {
            "production" | "prod" => Profile::Production,
            "development" | "dev" => Profile::Development,
            _ => Profile::Custom(name),
        };
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds a directory to the search list.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Disables `OVATION_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges programmatic overrides at the highest priority.
    pub fn merge(mut self, config: OvationConfig) -> Self {
        self.overrides = Some(config);
        self
    }

    /// Loads and extracts the configuration.
    pub fn load(self) -> ConfigResult<OvationConfig> {
        let mut figment = Figment::from(Serialized::defaults(OvationConfig::default()));

        if let Some(file) = &self.config_file {
            if !file.exists() {
                return Err(ConfigError::FileNotFound(file.display().to_string()));
            }
            figment = figment.merge(Toml::file(file));
        } else {
            let profile_name = self.profile.as_str();
            for dir in &self.search_paths {
                let profile_file = dir.join(format!("ovation.{profile_name}.toml"));
                if profile_file.exists() {
                    debug!(path = %profile_file.display(), "Merging profile config");
                    figment = figment.merge(Toml::file(profile_file));
                }
                let main_file = dir.join("ovation.toml");
                if main_file.exists() {
                    debug!(path = %main_file.display(), "Merging config file");
                    figment = figment.merge(Toml::file(main_file));
                }
            }
        }

        if self.load_env {
            figment = figment.merge(Env::prefixed("OVATION_").split("__"));
        }

        if let Some(overrides) = self.overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_without_any_file() {
        let config = ConfigLoader::new()
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.server.port, 8090);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = ConfigLoader::new()
            .file("/definitely/not/here/ovation.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ovation.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9999\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .file(&path)
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(
            config.logging.level,
            crate::config::schema::LogLevel::Debug
        );
        // Untouched sections keep defaults.
        assert_eq!(config.automation.history_limit, 200);
    }
}
