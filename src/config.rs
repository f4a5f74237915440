//! Binder configuration.
//!
//! [`TabularConfig`] holds the defaults applied by
//! [`TabularFormBuilder::config`](crate::TabularFormBuilder::config). Applications
//! load it from `config/config.toml` or environment variables using
//! `TabularConfig::load()`:
//!
//! ```toml
//! [tabular]
//! with_root = true
//! root_form_key = "Invoice"
//! ```
//!
//! or `TABULAR__TABULAR__WITH_ROOT=true`.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const CONFIG_PATH: &str = "config/config.toml";
const ENV_PREFIX: &str = "TABULAR";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TabularConfig {
    /// Also bind, validate and save the parent's own fields
    #[serde(default)]
    pub with_root: bool,
    /// Whether `save` validates first unless told otherwise
    #[serde(default = "default_true")]
    pub run_validation: bool,
    /// Whether `validate` clears earlier errors unless told otherwise
    #[serde(default = "default_true")]
    pub clear_errors: bool,
    /// Sub-form key, defaults to the child's form name
    #[serde(default)]
    pub form_key: Option<String>,
    /// Parent form key for with-root mode, defaults to the parent's form name
    #[serde(default)]
    pub root_form_key: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            with_root: false,
            run_validation: true,
            clear_errors: true,
            form_key: None,
            root_form_key: None,
        }
    }
}

impl TabularConfig {
    /// Load the configuration from `config/config.toml`, falling back to env vars.
    ///
    /// A missing `[tabular]` section yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_PATH).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // The file existed but could not be read or parsed: retry env only
                if std::path::Path::new(CONFIG_PATH).exists() {
                    log::warn!(
                        "failed to load {}, falling back to env. Error: {}",
                        CONFIG_PATH,
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        Self::from_settings(&settings)
    }

    /// Parse the `[tabular]` section of an inline TOML document
    pub fn load_from_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::from_settings(&settings)
    }

    fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        match settings.get::<TabularConfig>("tabular") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Tabular configuration could not be loaded: {}",
                e
            ))),
        }
    }
}
