use crate::config::ServeConfig;
use crate::error::{ConfigError, Result};
use figment::{
    providers::{Env, Format as _, Json, Serialized},
    Figment,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory.
pub const CONFIG_FILE_NAME: &str = "xrserve.config.json";

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_key: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_cert: Option<PathBuf>,
}

impl ServeConfig {
    /// Load configuration from multiple sources.
    /// Priority: CLI overrides > environment variables > config file > defaults
    ///
    /// An explicit `config_path` must exist; the implicit
    /// `xrserve.config.json` is only read when present.
    pub fn load(overrides: &ConfigOverrides, config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(ServeConfig::default()));

        let config_file = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()).into());
            }
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                default_path.exists().then(|| default_path.to_path_buf())
            }
        };

        if let Some(path) = config_file {
            figment = figment.merge(Json::file(path));
        }

        // XRSERVE_START_PORT -> startPort
        figment = figment.merge(
            Env::prefixed("XRSERVE_").map(|key| env_key_to_field(key.as_str()).into()),
        );

        figment = figment.merge(Serialized::defaults(overrides));

        let config: ServeConfig = figment.extract().map_err(|e| ConfigError::InvalidValue {
            field: "configuration".to_string(),
            value: e.to_string(),
            hint: format!("Check {} syntax and field types", CONFIG_FILE_NAME),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// `start_port` -> `startPort`.
pub(crate) fn env_key_to_field(key: &str) -> String {
    let mut field = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            field.extend(c.to_uppercase());
            upper = false;
        } else {
            field.extend(c.to_lowercase());
        }
    }
    field
}
