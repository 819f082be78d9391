//! Configuration handling for the cfgscript CLI

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "cfgscript.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub test: TestConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Record schema applied when `--schema` is not given
    #[serde(default)]
    pub schema: Option<PathBuf>,

    /// Variables passed to `main`; `--var` overrides them
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub verbose: bool,
}

/// How `run` prints records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document per line
    #[default]
    Json,
    /// A YAML document stream
    Yaml,
}

/// Load configuration from `path`, `./cfgscript.toml`, or use defaults
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => read_config(&path),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                read_config(default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
[run]
format = "yaml"
schema = "schemas/app.toml"

[run.vars]
env = "prod"
replicas = 3

[test]
verbose = true
"#,
        )
        .unwrap();

        assert_eq!(config.run.format, OutputFormat::Yaml);
        assert_eq!(config.run.schema, Some(PathBuf::from("schemas/app.toml")));
        assert_eq!(config.run.vars["env"], json!("prod"));
        assert_eq!(config.run.vars["replicas"], json!(3));
        assert!(config.test.verbose);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.run.format, OutputFormat::Json);
        assert!(config.run.schema.is_none());
        assert!(config.run.vars.is_empty());
        assert!(!config.test.verbose);
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cli.toml");
        std::fs::write(&path, "[run]\nformat = \"yaml\"\n").unwrap();

        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.run.format, OutputFormat::Yaml);
    }

    #[test]
    fn test_invalid_config_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cli.toml");
        std::fs::write(&path, "[run]\nformat = \"xml\"\n").unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }
}
