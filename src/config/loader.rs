//! Configuration loading.
//!
//! Precedence, lowest first: built-in defaults, the optional TOML file,
//! `SVCNAME`/`HOSTNAME`, then explicit flags.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::cli::Cli;
use crate::config::schema::ServiceConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Read a TOML file into a config. Missing keys take their defaults.
pub fn load_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Build the raw config from every source. Validation happens later.
pub fn load(cli: Cli) -> Result<ServiceConfig, ConfigError> {
    let mut config = match cli.config.as_deref() {
        Some(path) => load_file(path)?,
        None => ServiceConfig::default(),
    };
    cli.apply(&mut config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("topology-tester-{}-{name}", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_flags_override_file() {
        let path = temp_file("override.toml", "[behavior]\nerrors = 10\nheaders = 20\n");
        let cli = Cli {
            config: Some(path.clone()),
            errors: Some(50),
            ..Cli::default()
        };
        let config = load(cli).unwrap();
        assert_eq!(config.behavior.errors, 50);
        assert_eq!(config.behavior.headers, 20);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/topology.toml")),
            ..Cli::default()
        };
        assert!(matches!(load(cli), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let path = temp_file("broken.toml", "[behavior\nerrors = ");
        assert!(matches!(load_file(&path), Err(ConfigError::Parse { .. })));
        fs::remove_file(path).ok();
    }
}
