//! Handler functions for config CLI commands.
//!
//! Implements the `config` subcommands (`path`, `show`, `get`, `init`,
//! `export`) over [`NuSearchConfig`], plus the TOML dotted-key helpers they
//! share.

use std::path::PathBuf;

use nusearch_core::config::CONFIG_ENV;
use nusearch_core::{Error, NuSearchConfig, Result};

use crate::cli::ConfigAction;

// ============================================================================
// Command dispatch
// ============================================================================

/// Handle a config subcommand.
pub fn handle_config_command(config_path: Option<&str>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => cmd_config_path(config_path),
        ConfigAction::Show => cmd_config_show(config_path),
        ConfigAction::Get { key } => cmd_config_get(config_path, &key),
        ConfigAction::Init { file, force } => {
            cmd_config_init(file.as_deref().or(config_path), force)
        }
        ConfigAction::Export { docker_env } => {
            let config = NuSearchConfig::load(config_path)?;
            cmd_config_export(&config, docker_env);
            Ok(())
        }
    }
}

// ============================================================================
// Command handlers
// ============================================================================

/// Show the resolved config file path.
pub fn cmd_config_path(config_path: Option<&str>) -> Result<()> {
    match NuSearchConfig::resolve_config_path(config_path) {
        Some(path) => {
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("(file does not exist, run `nusearch config init` to create it)");
            }
            Ok(())
        }
        None => Err(Error::config(format!(
            "Could not determine config directory for this platform; set {CONFIG_ENV}"
        ))),
    }
}

/// Print the effective configuration (file plus environment overrides).
pub fn cmd_config_show(config_path: Option<&str>) -> Result<()> {
    let config = NuSearchConfig::load(config_path)?;
    print!("{}", redacted(&config).to_toml_string()?);
    Ok(())
}

/// Print one configuration value by dotted key.
pub fn cmd_config_get(config_path: Option<&str>, key: &str) -> Result<()> {
    let config = NuSearchConfig::load(config_path)?;
    println!("{}", config_value(&redacted(&config), key)?);
    Ok(())
}

/// Create a default configuration file.
pub fn cmd_config_init(file: Option<&str>, force: bool) -> Result<()> {
    let path = match file {
        Some(p) => PathBuf::from(p),
        None => NuSearchConfig::default_config_path()
            .ok_or_else(|| Error::config("Could not determine config directory"))?,
    };

    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }

    let toml_str = NuSearchConfig::default().to_toml_string()?;
    std::fs::write(&path, &toml_str).map_err(|e| Error::io_with_path(e, &path))?;

    println!("Config file created at {}", path.display());
    Ok(())
}

/// Print configuration as environment variables.
pub fn cmd_config_export(config: &NuSearchConfig, docker_env: bool) {
    for (key, value) in config.to_env_vars() {
        if docker_env {
            println!("--env {key}={value}");
        } else {
            println!("{key}={value}");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A copy of `config` safe to print.
pub fn redacted(config: &NuSearchConfig) -> NuSearchConfig {
    let mut config = config.clone();
    if config.engine.password.is_some() {
        config.engine.password = Some("********".to_string());
    }
    config
}

/// Look up a dotted key in the serialized configuration.
pub fn config_value(config: &NuSearchConfig, key: &str) -> Result<String> {
    let value = toml::Value::try_from(config).map_err(|e| Error::config(e.to_string()))?;
    get_nested_value(&value, key)
        .map(format_toml_value)
        .ok_or_else(|| Error::config(format!("Key '{key}' not found in configuration")))
}

/// Navigate a dotted key path in a TOML value tree.
pub fn get_nested_value<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.')
        .try_fold(value, |current, part| current.as_table()?.get(part))
}

/// Format a TOML value for display on stdout.
pub fn format_toml_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(dt) => dt.to_string(),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            toml::to_string_pretty(value).unwrap_or_else(|_| format!("{value:?}"))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> String {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        path.to_str().unwrap().to_string()
    }

    // ------------------------------------------------------------------------
    // cmd_config_path tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_cmd_config_path_explicit() {
        assert!(cmd_config_path(Some("/explicit/config.toml")).is_ok());
    }

    // ------------------------------------------------------------------------
    // cmd_config_show / cmd_config_get tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_cmd_config_show() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[bulk]\nbatch_size = 50\n");
        assert!(cmd_config_show(Some(&path)).is_ok());
    }

    #[test]
    fn test_cmd_config_get_missing_file() {
        let result = cmd_config_get(Some("/nonexistent/config.toml"), "bulk.batch_size");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_config_value_nested_key() {
        let config = NuSearchConfig::from_toml_str("[bulk]\nbatch_size = 50\n").unwrap();
        assert_eq!(config_value(&config, "bulk.batch_size").unwrap(), "50");
        assert_eq!(config_value(&config, "index.live_alias").unwrap(), "nusearch");
    }

    #[test]
    fn test_config_value_missing_key() {
        let err = config_value(&NuSearchConfig::default(), "bulk.nonexistent").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_redacted_hides_password() {
        let mut config = NuSearchConfig::default();
        config.engine.username = Some("elastic".to_string());
        config.engine.password = Some("secret".to_string());

        let shown = redacted(&config).to_toml_string().unwrap();
        assert!(shown.contains("elastic"));
        assert!(!shown.contains("secret"));
        assert_eq!(config.engine.password.as_deref(), Some("secret"));
    }

    // ------------------------------------------------------------------------
    // cmd_config_init tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_cmd_config_init_creates_loadable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nusearch").join("config.toml");

        cmd_config_init(Some(path.to_str().unwrap()), false).unwrap();

        let loaded = NuSearchConfig::from_file(&path).unwrap();
        assert_eq!(loaded, NuSearchConfig::default());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[bulk]"));
    }

    #[test]
    fn test_cmd_config_init_no_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "existing");

        let result = cmd_config_init(Some(&path), false);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[test]
    fn test_cmd_config_init_force_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "old content");

        cmd_config_init(Some(&path), true).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("live_alias"));
    }

    // ------------------------------------------------------------------------
    // TOML helper tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_get_nested_value() {
        let val: toml::Value = toml::from_str("[engine]\nurl = \"http://es:9200\"").unwrap();
        assert_eq!(
            get_nested_value(&val, "engine.url"),
            Some(&toml::Value::String("http://es:9200".to_string()))
        );
        assert!(get_nested_value(&val, "engine.nonexistent").is_none());
        assert!(get_nested_value(&val, "engine.url.deeper").is_none());
    }

    #[test]
    fn test_format_toml_value() {
        assert_eq!(format_toml_value(&toml::Value::String("hello".into())), "hello");
        assert_eq!(format_toml_value(&toml::Value::Integer(42)), "42");
        assert_eq!(format_toml_value(&toml::Value::Boolean(true)), "true");
    }
}
