//! Config path resolution tests
//!
//! Uses serial_test: these tests mutate CLIPDUEL_CONFIG and must not run in
//! parallel with each other.

use clipduel_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
#[serial]
fn test_env_var_used_when_no_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let path = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(path, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_argument_beats_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let path = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), CONFIG_ENV_VAR);
    assert_eq!(path, Some(PathBuf::from("/tmp/from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    let path = resolve_config_path(None, CONFIG_ENV_VAR);
    // Either nothing, or the platform default that happens to exist
    if let Some(path) = path {
        assert!(path.ends_with("clipduel/config.toml"));
    }

    env::remove_var(CONFIG_ENV_VAR);
}
