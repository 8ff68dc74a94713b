//! Configuration file resolution and loading
//!
//! Config file location follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/clipduel/config.toml`)
//! 4. None: callers fall back to built-in defaults
//!
//! A missing file is never fatal. Callers get defaults plus a warning.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CLIPDUEL_CONFIG";

/// Application directory under the platform config directory
const APP_DIR: &str = "clipduel";

/// Config file name inside the application directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Resolve which config file to read
///
/// Explicit locations (CLI argument, environment variable) are returned even
/// when the file does not exist, so the caller can warn about it. The
/// platform default is only returned when present.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// Platform default config file path, if the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME))
}

/// Parse a TOML config file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Load config from `path`, degrading to defaults when it is absent
///
/// - `None` → defaults, no warning (no config was requested or found)
/// - path missing on disk → defaults with a warning
/// - path present but invalid → error (a broken file is a user mistake)
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    info!("Loading config from {}", path.display());
    load_toml(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        retries: u32,
    }

    #[test]
    fn test_cli_argument_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/explicit.toml")), "CLIPDUEL_TEST_UNSET_VAR");
        assert_eq!(path, Some(PathBuf::from("/tmp/explicit.toml")));
    }

    #[test]
    fn test_load_or_default_without_path() {
        let sample: Sample = load_or_default(None).unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let sample: Sample = load_or_default(Some(&missing)).unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_load_or_default_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"scramble\"\nretries = 3").unwrap();

        let sample: Sample = load_or_default(Some(file.path())).unwrap();
        assert_eq!(sample.name, "scramble");
        assert_eq!(sample.retries, 3);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "retries = \"many\"").unwrap();

        let result: Result<Sample> = load_or_default(Some(file.path()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unreadable_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let result: Result<Sample> = load_toml(dir.path());
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
