//! Server configuration: `esmod.config.json` plus environment overrides.
//!
//! Layering, lowest to highest: built-in defaults, the config file in the
//! working directory, `ESMOD_*` environment variables. CLI flags override
//! all of it at the call site.

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CliError, Result};

/// On-disk configuration; every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// "dev" or "production". The `dev` subcommand always wins; this lets a
    /// project pin dev mode for the plain `serve` command.
    pub mode: Option<String>,

    /// Port to serve on.
    pub port: Option<u16>,
}

impl ServerConfig {
    /// File name looked up in the working directory.
    pub const FILE_NAME: &'static str = "esmod.config.json";

    /// Load the layered configuration for `root`.
    ///
    /// A missing config file is fine; an unparsable one is a startup error.
    pub fn load(root: &Path) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = root.join(Self::FILE_NAME);
        if file.exists() {
            figment = figment.merge(Json::file(file));
        }
        figment = figment.merge(Env::prefixed("ESMOD_"));

        figment
            .extract()
            .map_err(|err| CliError::Config(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(dir.path()).unwrap();
        assert!(config.mode.is_none());
        assert!(config.port.is_none());
    }

    #[test]
    fn test_file_fields_are_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ServerConfig::FILE_NAME),
            r#"{ "mode": "dev", "port": 3000 }"#,
        )
        .unwrap();

        let config = ServerConfig::load(dir.path()).unwrap();
        assert_eq!(config.mode.as_deref(), Some("dev"));
        assert_eq!(config.port, Some(3000));
    }

    #[test]
    fn test_invalid_json_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ServerConfig::FILE_NAME), "{ mode: ").unwrap();

        let err = ServerConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
