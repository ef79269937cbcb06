use std::path::Path;

use opportunity_core::{Error, config::AnalysisConfig};

/// Loads the analysis configuration from a TOML file, or the defaults when
/// no file is given. The result is validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, Error> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("Failed to read config '{}': {e}", path.display()),
                )
            })?;
            toml::from_str(&text).map_err(|e| {
                Error::InvalidConfig(format!("{}: {e}", path.display()))
            })?
        }
        None => AnalysisConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
