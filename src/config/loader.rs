//! Layered configuration loading.
//!
//! Sources, lowest priority first:
//! 1. `default.toml` (required)
//! 2. `{environment}.toml` (optional)
//! 3. `local.toml` (optional)
//! 4. `STOREFRONT_*` environment variables, `__` between nested keys
//!
//! A single file selected with `STOREFRONT_CONFIG_FILE` or `--config`
//! replaces the three files; environment variables still apply on top.

use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};

use crate::config::environment::Environment as AppEnvironment;
use crate::config::error::ConfigError;
use crate::config::settings::Settings;

const CONFIG_DIR_ENV: &str = "STOREFRONT_CONFIG_DIR";
const CONFIG_FILE_ENV: &str = "STOREFRONT_CONFIG_FILE";
const DEFAULT_CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "STOREFRONT";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
    /// When set, layered loading is skipped
    config_file: Option<PathBuf>,
    environment: AppEnvironment,
}

impl ConfigLoader {
    /// Creates a loader from `STOREFRONT_CONFIG_DIR`, `STOREFRONT_CONFIG_FILE`
    /// and `STOREFRONT_APP_ENV`.
    ///
    /// # Errors
    ///
    /// Fails when both the directory and the file variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config_dir = std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from);
        let config_file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);

        if config_dir.is_some() && config_file.is_some() {
            return Err(ConfigError::ConflictingSources(format!(
                "{CONFIG_DIR_ENV} and {CONFIG_FILE_ENV} cannot both be set. \
                 Use {CONFIG_DIR_ENV} for layered configuration or \
                 {CONFIG_FILE_ENV} for a single configuration file."
            )));
        }

        Ok(Self {
            config_dir: config_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            config_file,
            environment: AppEnvironment::from_env(),
        })
    }

    /// Creates a loader for a configuration directory.
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            config_file: None,
            environment: AppEnvironment::default(),
        }
    }

    /// Loads a single file instead of the layered directory.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn with_environment(mut self, environment: AppEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn environment(&self) -> AppEnvironment {
        self.environment
    }

    /// Loads and validates the settings.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let settings = self.load_unvalidated()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads the settings without validating them, for callers that apply
    /// further overrides first.
    pub fn load_unvalidated(&self) -> Result<Settings, ConfigError> {
        self.build_config()?
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize configuration: {e}")))
    }

    fn build_config(&self) -> Result<Config, ConfigError> {
        let builder = Config::builder();

        let builder = match &self.config_file {
            Some(config_file) => add_file_source(builder, config_file, true)?,
            None => self.add_layered_sources(builder)?,
        };

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()
            .map_err(ConfigError::from)
    }

    fn add_layered_sources(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let builder = add_file_source(builder, &self.config_dir.join("default.toml"), true)?;
        let env_file = self
            .config_dir
            .join(format!("{}.toml", self.environment.as_str()));
        let builder = add_file_source(builder, &env_file, false)?;
        add_file_source(builder, &self.config_dir.join("local.toml"), false)
    }
}

fn add_file_source(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
    required: bool,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if required && !path.is_file() {
        return Err(ConfigError::file_not_found(format!(
            "Required configuration file not found: {}",
            path.display()
        )));
    }

    Ok(builder.add_source(
        File::new(path.to_str().unwrap_or_default(), FileFormat::Toml).required(required),
    ))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;

    // Tests that read or write STOREFRONT_* variables run one at a time.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const DEFAULT_TOML: &str = r#"
[application]
name = "storefront-test"

[server]
host = "127.0.0.1"
port = 5000
request_timeout = 30

[database]
url = "postgres://localhost/storefront"
max_connections = 10
min_connections = 1
connection_timeout = 5

[jwt]
secret = "0123456789abcdef0123456789abcdef"

[logger]
level = "info"
"#;

    fn config_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    struct EnvGuard {
        restore: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self {
                restore: Vec::new(),
            }
        }

        fn set(&mut self, key: &str, value: &str) {
            self.restore.push((key.to_string(), std::env::var(key).ok()));
            unsafe {
                std::env::set_var(key, value);
            }
        }

        fn remove(&mut self, key: &str) {
            self.restore.push((key.to_string(), std::env::var(key).ok()));
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.restore.iter().rev() {
                unsafe {
                    match value {
                        Some(value) => std::env::set_var(key, value),
                        None => std::env::remove_var(key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut env = EnvGuard::new();
        env.remove(CONFIG_DIR_ENV);
        env.remove(CONFIG_FILE_ENV);
        env.remove(AppEnvironment::ENV_VAR);

        let loader = ConfigLoader::from_env().unwrap();

        assert_eq!(loader.config_dir, PathBuf::from("config"));
        assert!(loader.config_file.is_none());
        assert_eq!(loader.environment(), AppEnvironment::Development);
    }

    #[test]
    fn test_dir_and_file_are_mutually_exclusive() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut env = EnvGuard::new();
        env.set(CONFIG_DIR_ENV, "/etc/storefront");
        env.set(CONFIG_FILE_ENV, "/etc/storefront/app.toml");

        match ConfigLoader::from_env() {
            Err(ConfigError::ConflictingSources(msg)) => {
                assert!(msg.contains(CONFIG_DIR_ENV));
                assert!(msg.contains(CONFIG_FILE_ENV));
            }
            other => panic!("Expected ConflictingSources, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_default_toml() {
        let dir = config_dir(&[]);

        match ConfigLoader::with_dir(dir.path()).load() {
            Err(ConfigError::FileNotFound(msg)) => assert!(msg.contains("default.toml")),
            other => panic!("Expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_layers_override_in_order() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut env = EnvGuard::new();
        env.remove("STOREFRONT_SERVER__PORT");

        let dir = config_dir(&[
            ("default.toml", DEFAULT_TOML),
            (
                "production.toml",
                "[server]\nhost = \"0.0.0.0\"\nport = 8080\n[database]\nmax_connections = 50\n",
            ),
            ("local.toml", "[server]\nport = 8081\n"),
        ]);

        let settings = ConfigLoader::with_dir(dir.path())
            .with_environment(AppEnvironment::Production)
            .load()
            .unwrap();

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.database.max_connections, 50);
        assert_eq!(settings.database.min_connections, 1);
        assert_eq!(settings.application.name, "storefront-test");
    }

    #[test]
    fn test_environment_variables_win() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut env = EnvGuard::new();
        env.set("STOREFRONT_SERVER__PORT", "9090");
        env.set("STOREFRONT_DATABASE__URL", "memory://");

        let dir = config_dir(&[("default.toml", DEFAULT_TOML)]);
        let settings = ConfigLoader::with_dir(dir.path()).load().unwrap();

        assert_eq!(settings.server.port, 9090);
        assert!(settings.database.is_memory());
    }

    #[test]
    fn test_single_file_mode_skips_layers() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut env = EnvGuard::new();
        env.remove("STOREFRONT_SERVER__PORT");

        let dir = config_dir(&[("default.toml", DEFAULT_TOML)]);
        let file = dir.path().join("only.toml");
        fs::write(
            &file,
            DEFAULT_TOML.replace("port = 5000", "port = 7000"),
        )
        .unwrap();

        let settings = ConfigLoader::with_dir("/nonexistent")
            .with_config_file(&file)
            .load()
            .unwrap();

        assert_eq!(settings.server.port, 7000);
    }

    #[test]
    fn test_invalid_values_are_rejected_on_load() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut env = EnvGuard::new();
        env.remove("STOREFRONT_JWT__SECRET");

        let weak = DEFAULT_TOML.replace("0123456789abcdef0123456789abcdef", "short");
        let dir = config_dir(&[("default.toml", weak.as_str())]);

        let loader = ConfigLoader::with_dir(dir.path());
        assert!(loader.load_unvalidated().is_ok());
        match loader.load() {
            Err(ConfigError::ValidationError { field, .. }) => assert_eq!(field, "jwt.secret"),
            other => panic!("Expected ValidationError, got {other:?}"),
        }
    }
}
