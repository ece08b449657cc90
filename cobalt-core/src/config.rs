use std::path::Path;

use figment::{
    providers::{Format, Json, Toml},
    Figment,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::utils::replace_env_var_in_string;

/// Load a configuration from a JSON or TOML file, picked by extension.
///
/// `${NAME}` in the path is replaced with the environment variable `NAME`.
pub fn load<T, S>(path: S) -> Result<T>
where
    T: DeserializeOwned,
    S: AsRef<str>,
{
    let parsed_path = replace_env_var_in_string(path.as_ref());
    let file_path = Path::new(parsed_path.as_ref());
    if !file_path.exists() {
        return Err(Error::ConfigError(format!(
            "Config file not found: {}",
            file_path.display()
        )));
    }
    let figment = match file_path.extension() {
        Some(ext) if ext == "json" => Figment::new().merge(Json::file(file_path)),
        Some(ext) if ext == "toml" => Figment::new().merge(Toml::file(file_path)),
        _ => {
            return Err(Error::ConfigError(format!(
                "Unknown config file format: {}",
                file_path.display()
            )))
        }
    };
    debug!("Load config from {}", file_path.display());
    figment
        .extract()
        .map_err(|e| Error::ConfigError(e.to_string()))
}
