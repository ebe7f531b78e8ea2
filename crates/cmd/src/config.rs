use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "SHEETLOG_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Rows returned by a fetch that does not name a limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Edit a random sample instead of the whole dataset
    #[serde(default)]
    pub sample: Option<SampleConfig>,

    /// Fixed engine identifier; a UUID v7 is generated when absent
    #[serde(default)]
    pub engine_id: Option<String>,

    /// Dataset name; defaults to the CSV file stem
    #[serde(default)]
    pub dataset_name: Option<String>,

    #[serde(default)]
    pub csv: CsvOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SampleConfig {
    pub size: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// CSV parsing options, following arrow_csv's reader defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CsvOptions {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default = "default_has_header")]
    pub has_header: bool,

    /// Rows read for schema inference
    #[serde(default = "default_infer_records")]
    pub schema_infer_max_records: usize,
}

fn default_limit() -> usize {
    oplog::Window::DEFAULT_LIMIT
}

fn default_delimiter() -> char {
    ','
}

fn default_has_header() -> bool {
    true
}

fn default_infer_records() -> usize {
    100
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            has_header: default_has_header(),
            schema_infer_max_records: default_infer_records(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            sample: None,
            engine_id: None,
            dataset_name: None,
            csv: CsvOptions::default(),
        }
    }
}

/// Load configuration from YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let config: Config =
        serde_yaml_ng::from_str(&content).with_context(|| "Failed to parse YAML configuration")?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.default_limit == 0 {
        anyhow::bail!("defaultLimit must be greater than 0");
    }

    if let Some(sample) = &config.sample {
        if sample.size == 0 {
            anyhow::bail!("sample size must be greater than 0");
        }
    }

    if let Some(id) = &config.engine_id {
        if id.trim().is_empty() {
            anyhow::bail!("engineId cannot be empty");
        }
    }

    if let Some(name) = &config.dataset_name {
        if name.trim().is_empty() {
            anyhow::bail!("datasetName cannot be empty");
        }
    }

    if !config.csv.delimiter.is_ascii() {
        anyhow::bail!("CSV delimiter must be a single ASCII character");
    }

    Ok(())
}

/// Configuration from `explicit`, else from SHEETLOG_CONFIG, else defaults
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    match path {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_config() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("sheet.yaml");
        std::fs::write(
            &path,
            "defaultLimit: 25\nsample:\n  size: 100\n  seed: 7\nengineId: local\ncsv:\n  delimiter: ';'\n",
        )?;
        let config = load_config(&path)?;
        assert_eq!(config.default_limit, 25);
        assert_eq!(
            config.sample,
            Some(SampleConfig {
                size: 100,
                seed: Some(7)
            })
        );
        assert_eq!(config.engine_id.as_deref(), Some("local"));
        assert_eq!(config.csv.delimiter, ';');
        assert!(config.csv.has_header);
        Ok(())
    }

    #[test]
    fn test_empty_file_gives_defaults() -> Result<()> {
        let config: Config = serde_yaml_ng::from_str("{}")?;
        assert_eq!(config, Config::default());
        assert_eq!(config.default_limit, 10);
        Ok(())
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_limit = Config {
            default_limit: 0,
            ..Config::default()
        };
        assert!(validate_config(&zero_limit).is_err());

        let empty_sample = Config {
            sample: Some(SampleConfig { size: 0, seed: None }),
            ..Config::default()
        };
        assert!(validate_config(&empty_sample).is_err());

        assert!(serde_yaml_ng::from_str::<Config>("limit: 3").is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config("/nonexistent/sheet.yaml").expect_err("missing file");
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
