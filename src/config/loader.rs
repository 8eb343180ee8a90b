//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in this order,
//! later sources overriding earlier ones:
//!
//! 1. Built-in defaults ([`SupportConfig::default`])
//! 2. `<config_dir>/conduit.toml`
//! 3. `<config_dir>/conduit.<environment>.toml`
//! 4. `CONDUIT__<SECTION>__<KEY>` environment variables
//!
//! Both files are optional. The environment is taken from `CONDUIT_ENV`,
//! then `APP_ENV`, and defaults to `development`.

use super::SupportConfig;
use crate::constants::defaults;
use crate::error::{SupportError, SupportResult};
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: SupportConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigLoader {
    /// Load configuration with environment auto-detection
    pub fn load() -> SupportResult<Arc<ConfigLoader>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> SupportResult<Arc<ConfigLoader>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> SupportResult<Arc<ConfigLoader>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Load configuration reading overrides from `overrides` instead of the
    /// process environment. Keys use the same `CONDUIT__SECTION__KEY` form.
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> SupportResult<Arc<ConfigLoader>> {
        let config_directory =
            config_dir.unwrap_or_else(|| PathBuf::from(defaults::CONFIG_DIR));

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment, overrides)?;
        config.validate()?;

        info!(
            environment = environment,
            pooled = config.exchange.pooled,
            uuid_generator = ?config.uuid.generator,
            reload_enabled = config.reload.enabled,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigLoader {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load a single TOML file on top of the defaults, ignoring environment variables
    pub fn load_file(path: &Path) -> SupportResult<SupportConfig> {
        if !path.is_file() {
            return Err(SupportError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let config: SupportConfig = Config::builder()
            .add_source(Config::try_from(&SupportConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &SupportConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON, for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    /// Detect the active environment from `CONDUIT_ENV` or `APP_ENV`
    pub fn detect_environment() -> String {
        env::var(format!("{}_ENV", defaults::ENV_PREFIX))
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> SupportResult<SupportConfig> {
        let base = config_directory.join(format!("{}.toml", defaults::CONFIG_BASENAME));
        let env_specific =
            config_directory.join(format!("{}.{environment}.toml", defaults::CONFIG_BASENAME));

        let env_source = Environment::with_prefix(defaults::ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .ignore_empty(true)
            .source(overrides);

        let config = Config::builder()
            .add_source(Config::try_from(&SupportConfig::default())?)
            .add_source(File::from(base).format(FileFormat::Toml).required(false))
            .add_source(File::from(env_specific).format(FileFormat::Toml).required(false))
            .add_source(env_source)
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_generator::UuidGeneratorKind;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_missing_directory_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::load_with_overrides(
            Some(temp.path().join("absent")),
            "test",
            Some(HashMap::new()),
        )
        .unwrap();
        assert_eq!(loader.config(), &SupportConfig::default());
        assert_eq!(loader.environment(), "test");
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "conduit.toml",
            "[exchange]\npooled = true\npool_capacity = 10\n\n[uuid]\ngenerator = \"simple\"\n",
        );
        write(
            temp.path(),
            "conduit.production.toml",
            "[exchange]\npool_capacity = 500\n",
        );

        let loader = ConfigLoader::load_with_overrides(
            Some(temp.path().to_path_buf()),
            "production",
            Some(HashMap::new()),
        )
        .unwrap();
        let config = loader.config();
        assert!(config.exchange.pooled);
        assert_eq!(config.exchange.pool_capacity, 500);
        assert_eq!(config.uuid.generator, UuidGeneratorKind::Simple);
    }

    #[test]
    fn test_environment_variables_override_files() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "conduit.toml", "[polling]\ndelay_ms = 100\n");

        let overrides = HashMap::from([
            ("CONDUIT__POLLING__DELAY_MS".to_string(), "750".to_string()),
            ("CONDUIT__POLLING__GREEDY".to_string(), "true".to_string()),
        ]);
        let loader = ConfigLoader::load_with_overrides(
            Some(temp.path().to_path_buf()),
            "development",
            Some(overrides),
        )
        .unwrap();
        assert_eq!(loader.config().polling.delay_ms, 750);
        assert!(loader.config().polling.greedy);
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "conduit.toml", "[reload]\nenabled = true\n");

        let result = ConfigLoader::load_with_overrides(
            Some(temp.path().to_path_buf()),
            "development",
            Some(HashMap::new()),
        );
        assert!(matches!(result, Err(SupportError::Configuration(_))));
    }

    #[test]
    fn test_load_file_requires_existing_file() {
        let temp = TempDir::new().unwrap();
        assert!(ConfigLoader::load_file(&temp.path().join("nope.toml")).is_err());

        write(temp.path(), "custom.toml", "[events]\nlog_events = true\n");
        let config = ConfigLoader::load_file(&temp.path().join("custom.toml")).unwrap();
        assert!(config.events.log_events);
    }
}
