use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Overrides `[remote] base-url`
pub const ENV_BASE_URL: &str = "LMIS_BASE_URL";
/// Overrides `[remote] scip-url`
pub const ENV_SCIP_URL: &str = "LMIS_SCIP_URL";
/// Overrides `[output] database-path`
pub const ENV_DATABASE_PATH: &str = "LMIS_DATABASE_PATH";
/// Overrides `[output] root`
pub const ENV_OUTPUT_ROOT: &str = "LMIS_OUTPUT_ROOT";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied before validation.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Loads the file if one is given, otherwise starts from defaults
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let mut config = Config::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            validate(&config)?;
            Ok(config)
        }
    }
}

/// Applies `LMIS_*` overrides using the given variable lookup
///
/// Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(ENV_BASE_URL) {
        tracing::debug!("{} overrides base-url", ENV_BASE_URL);
        config.remote.base_url = url;
    }
    if let Some(url) = get(ENV_SCIP_URL) {
        config.remote.scip_url = url;
    }
    if let Some(path) = get(ENV_DATABASE_PATH) {
        tracing::debug!("{} overrides database-path", ENV_DATABASE_PATH);
        config.output.database_path = path;
    }
    if let Some(root) = get(ENV_OUTPUT_ROOT) {
        config.output.root = root;
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at start-up so runs can be matched to the configuration they used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ParallelLevel, SinkKind};
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[remote]
base-url = "http://localhost:8080/reports/"
max-retries = 3

[harvest]
start = "2023-01"
end = "2023-03"
workers = 4
parallel-level = "period"

[pacing]
item-delay-ms = 0
union-delay-ms = 0
upazila-delay-ms = 10
warehouse-delay-ms = 10

[output]
sink = "sqlite"
database-path = "./test.db"

[[items]]
code = "CON002"
name = "Condom"

[[warehouses]]
id = "WH-001"
name = "Bhola RWH"
district = "Bhola"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.remote.max_retries, 3);
        assert_eq!(config.harvest.workers, 4);
        assert_eq!(config.harvest.parallel_level, ParallelLevel::Period);
        assert_eq!(config.output.sink, SinkKind::Sqlite);
        assert_eq!(config.items.len(), 1);
        assert_eq!(config.warehouses.len(), 1);
        assert_eq!(config.district_for("WH-001", ""), Some("Bhola".to_string()));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.remote.max_retries, 5);
        assert_eq!(config.remote.timeout_secs, 60);
        assert_eq!(config.items.len(), 12);
        assert_eq!(config.warehouses.len(), 23);
        assert_eq!(config.harvest.eligible_marker, "tick.png");
        assert_eq!(config.output.sink, SinkKind::File);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[pacing]
item-delay-ms = 5000
union-delay-ms = 10
"#;
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_BASE_URL, "http://127.0.0.1:9000/"),
            (ENV_DATABASE_PATH, "/tmp/x.db"),
            (ENV_OUTPUT_ROOT, ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.remote.base_url, "http://127.0.0.1:9000/");
        assert_eq!(config.output.database_path, "/tmp/x.db");
        assert_eq!(config.output.root, "data");
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
