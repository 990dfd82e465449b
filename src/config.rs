use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Context, Result};
use toml::Value;
use log::{debug, info};
use crate::meta::github::{DEFAULT_TOKEN_ENV, GITHUB_GRAPHQL_ENDPOINT};
use crate::scanner::config::AnalysisConfig;

/// Configuration storage - section_name -> key -> value
pub type Configuration = HashMap<String, HashMap<String, Value>>;

/// Default per-request timeout for the issue tracker
pub const DEFAULT_META_TIMEOUT_SECS: u64 = 30;

/// Meta-analysis settings from the `[meta]` section
#[derive(Debug, Clone, PartialEq)]
pub struct MetaSettings {
    pub enabled: bool,
    pub token_env: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for MetaSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            endpoint: GITHUB_GRAPHQL_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_META_TIMEOUT_SECS),
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    config: Configuration,
    config_file_path: Option<PathBuf>,
    selected_section: Option<String>,
}

impl ConfigManager {
    /// Create a new ConfigManager from a Configuration (primarily for testing)
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            config_file_path: None,
            selected_section: None,
        }
    }

    /// Load configuration using discovery hierarchy
    pub fn load() -> Result<Self> {
        debug!("Starting configuration discovery");

        for path in discover_config_files() {
            debug!("Attempting to load config from: {}", path.display());
            if path.exists() {
                return Self::load_from_file(path);
            }
        }

        info!("No configuration file found, using defaults");
        Ok(Self::from_config(Configuration::new()))
    }

    /// Load configuration from explicit file path
    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = parse_toml_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Loaded configuration from: {}", path.display());
        Ok(Self {
            config,
            config_file_path: Some(path),
            selected_section: None,
        })
    }

    pub fn config_file_path(&self) -> Option<&PathBuf> {
        self.config_file_path.as_ref()
    }

    /// Select configuration section for --config-name
    pub fn select_section(&mut self, section: String) {
        debug!("Selecting configuration section: {}", section);
        self.selected_section = Some(section);
    }

    /// Lookup order: selected section, then `section`, then `[base]`
    pub fn get_value(&self, section: &str, key: &str) -> Option<&Value> {
        if let Some(selected) = &self.selected_section {
            if let Some(value) = self.config.get(selected).and_then(|s| s.get(key)) {
                return Some(value);
            }
        }

        if let Some(value) = self.config.get(section).and_then(|s| s.get(key)) {
            return Some(value);
        }

        self.config.get("base").and_then(|s| s.get(key))
    }

    pub fn get_string(&self, section: &str, key: &str) -> Result<Option<String>> {
        match self.get_value(section, key) {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(anyhow::anyhow!("Expected a string for {section}.{key}, found {other}")),
            None => Ok(None),
        }
    }

    /// Get boolean value; the strings "true"/"false" are accepted too
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get_value(section, key) {
            Some(Value::Boolean(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.to_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(anyhow::anyhow!("Invalid boolean value for {section}.{key}: {s}")),
            },
            Some(other) => Err(anyhow::anyhow!("Invalid boolean value for {section}.{key}: {other}")),
            None => Ok(None),
        }
    }

    pub fn get_u64(&self, section: &str, key: &str) -> Result<Option<u64>> {
        match self.get_value(section, key) {
            Some(Value::Integer(i)) => u64::try_from(*i)
                .map(Some)
                .map_err(|_| anyhow::anyhow!("Negative value for {section}.{key}: {i}")),
            Some(Value::String(s)) => s
                .parse::<u64>()
                .map(Some)
                .with_context(|| format!("Invalid number for {section}.{key}: {s}")),
            Some(other) => Err(anyhow::anyhow!("Invalid number for {section}.{key}: {other}")),
            None => Ok(None),
        }
    }

    pub fn get_usize(&self, section: &str, key: &str) -> Result<Option<usize>> {
        self.get_u64(section, key)?
            .map(|n| usize::try_from(n).with_context(|| format!("Value too large for {section}.{key}")))
            .transpose()
    }

    /// A list of strings; a single string is treated as a one-element list
    pub fn get_list(&self, section: &str, key: &str) -> Result<Option<Vec<String>>> {
        match self.get_value(section, key) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(anyhow::anyhow!("Expected strings in {section}.{key}, found {other}")),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
            Some(other) => Err(anyhow::anyhow!("Expected a list for {section}.{key}, found {other}")),
            None => Ok(None),
        }
    }

    /// Get log level value with type conversion
    pub fn get_log_level(&self, section: &str, key: &str) -> Result<Option<log::LevelFilter>> {
        match self.get_string(section, key)? {
            Some(value) => Ok(Some(crate::logging::parse_log_level(&value)?)),
            None => Ok(None),
        }
    }

    pub fn get_path(&self, section: &str, key: &str) -> Result<Option<PathBuf>> {
        Ok(self.get_string(section, key)?.map(PathBuf::from))
    }

    /// Analysis configuration from `[analysis]` and `[extractors]`, validated
    pub fn get_analysis_config(&self) -> Result<AnalysisConfig> {
        let mut builder = AnalysisConfig::builder();

        if let Some(dirs) = self.get_list("analysis", "exclude-dirs")? {
            builder = builder.with_excluded_dirs(dirs);
        }
        if let Some(extensions) = self.get_list("analysis", "exclude-extensions")? {
            builder = builder.with_excluded_extensions(extensions);
        }
        if let Some(workers) = self.get_usize("analysis", "workers")? {
            builder = builder.with_workers(workers);
        }
        if let Some(threshold) = self.get_usize("analysis", "parallel-threshold")? {
            builder = builder.with_parallel_threshold(threshold);
        }
        if let Some(dir) = self.get_path("analysis", "workspace-dir")? {
            builder = builder.with_workspace_dir(dir);
        }
        if let Some(secs) = self.get_u64("analysis", "deadline-secs")? {
            builder = builder.with_deadline(Duration::from_secs(secs));
        }
        if let Some(secs) = self.get_u64("analysis", "command-timeout-secs")? {
            builder = builder.with_command_timeout(secs);
        }

        if let Some(extractors) = self.config.get("extractors") {
            for (extension, command) in extractors {
                let command = command
                    .as_str()
                    .with_context(|| format!("Extractor command for '{extension}' must be a string"))?;
                builder = builder.with_extractor_command(extension.as_str(), command);
            }
        }

        builder.build().context("Analysis configuration validation failed")
    }

    /// Metric database location, `<data_dir>/gevol/metrics.db` unless configured
    pub fn get_database_path(&self) -> Result<PathBuf> {
        if let Some(path) = self.get_path("store", "database")? {
            return Ok(path);
        }
        Ok(dirs::data_dir()
            .unwrap_or_else(env::temp_dir)
            .join("gevol")
            .join("metrics.db"))
    }

    pub fn get_meta_settings(&self) -> Result<MetaSettings> {
        let mut settings = MetaSettings::default();

        if let Some(enabled) = self.get_bool("meta", "enabled")? {
            settings.enabled = enabled;
        }
        if let Some(token_env) = self.get_string("meta", "token-env")? {
            settings.token_env = token_env;
        }
        if let Some(endpoint) = self.get_string("meta", "endpoint")? {
            settings.endpoint = endpoint;
        }
        if let Some(secs) = self.get_u64("meta", "timeout-secs")? {
            if secs == 0 {
                return Err(anyhow::anyhow!("meta.timeout-secs must be greater than zero"));
            }
            settings.timeout = Duration::from_secs(secs);
        }

        Ok(settings)
    }
}

/// Discover configuration files in order of precedence
fn discover_config_files() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = env::var("GEVOL_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("gevol").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".gevol.toml"));
    }

    paths.push(PathBuf::from("./.gevol.toml"));

    debug!("Config discovery paths: {:?}", paths);
    paths
}

/// Parse TOML content into sections of typed values
fn parse_toml_config(content: &str) -> Result<Configuration> {
    let table: toml::Table = content.parse().context("Failed to parse TOML content")?;

    let mut config = Configuration::new();
    flatten_toml_table(&table, String::new(), &mut config);

    debug!("Parsed configuration sections: {:?}", config.keys().collect::<Vec<_>>());
    Ok(config)
}

/// Nested tables become `parent.child` sections; top-level scalars land in `[base]`
fn flatten_toml_table(table: &toml::Table, prefix: String, config: &mut Configuration) {
    for (key, value) in table {
        match value {
            Value::Table(subtable) => {
                let section_name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                let section = config.entry(section_name.clone()).or_default();
                for (subkey, subvalue) in subtable {
                    if !subvalue.is_table() {
                        section.insert(subkey.clone(), subvalue.clone());
                    }
                }
                let nested: toml::Table = subtable
                    .iter()
                    .filter(|(_, v)| v.is_table())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                flatten_toml_table(&nested, section_name, config);
            }
            _ => {
                let section = if prefix.is_empty() { "base".to_string() } else { prefix.clone() };
                config.entry(section).or_default().insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
log-level = "debug"

[analysis]
exclude-dirs = [".git", "node_modules"]
exclude-extensions = [".min.js"]
workers = 4
parallel-threshold = 25
deadline-secs = 600

[store]
database = "/var/lib/gevol/metrics.db"

[meta]
token-env = "GEVOL_TOKEN"
timeout-secs = 10

[extractors]
".py" = "python3 radon_metrics.py"

[ci]
workers = 2
enabled = false
"#;

    fn manager(content: &str) -> ConfigManager {
        ConfigManager::from_config(parse_toml_config(content).unwrap())
    }

    #[test]
    fn test_parse_toml_sections() {
        let config = parse_toml_config(SAMPLE).unwrap();
        assert_eq!(config["base"]["log-level"].as_str(), Some("debug"));
        assert_eq!(config["analysis"]["workers"].as_integer(), Some(4));
        assert_eq!(config["extractors"][".py"].as_str(), Some("python3 radon_metrics.py"));
    }

    #[test]
    fn test_nested_sections_flatten_with_dots() {
        let config = parse_toml_config("[profile.fast]\nworkers = 8\n[profile.fast.inner]\nx = 1\n").unwrap();
        assert_eq!(config["profile.fast"]["workers"].as_integer(), Some(8));
        assert_eq!(config["profile.fast.inner"]["x"].as_integer(), Some(1));
    }

    #[test]
    fn test_value_lookup_falls_back_to_base() {
        let manager = manager(SAMPLE);
        assert_eq!(manager.get_string("analysis", "log-level").unwrap().unwrap(), "debug");
        assert!(manager.get_value("analysis", "missing").is_none());
    }

    #[test]
    fn test_selected_section_overrides() {
        let mut manager = manager(SAMPLE);
        assert_eq!(manager.get_usize("analysis", "workers").unwrap(), Some(4));

        manager.select_section("ci".to_string());
        assert_eq!(manager.get_usize("analysis", "workers").unwrap(), Some(2));
        assert_eq!(manager.get_bool("meta", "enabled").unwrap(), Some(false));
        // Keys the selected section lacks still come from the requested one
        assert_eq!(manager.get_usize("analysis", "parallel-threshold").unwrap(), Some(25));
    }

    #[test]
    fn test_type_conversion() {
        let manager = manager(
            "[base]\nflag = \"TRUE\"\nbad-flag = \"maybe\"\nlevel = \"warn\"\nnegative = -1\nlist = \"one\"\n",
        );
        assert_eq!(manager.get_bool("base", "flag").unwrap(), Some(true));
        assert!(manager.get_bool("base", "bad-flag").is_err());
        assert_eq!(manager.get_log_level("base", "level").unwrap(), Some(log::LevelFilter::Warn));
        assert!(manager.get_u64("base", "negative").is_err());
        assert_eq!(manager.get_list("base", "list").unwrap(), Some(vec!["one".to_string()]));
        assert!(manager.get_string("base", "negative").is_err());
    }

    #[test]
    fn test_analysis_config_from_toml() {
        let config = manager(SAMPLE).get_analysis_config().unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.parallel_threshold, 25);
        assert_eq!(config.deadline, Some(Duration::from_secs(600)));
        assert_eq!(config.settings.excluded_dirs, vec![".git".to_string(), "node_modules".to_string()]);
        assert_eq!(config.settings.excluded_extensions, vec![".min.js".to_string()]);
        assert_eq!(config.settings.extractor_commands[".py"], "python3 radon_metrics.py");
    }

    #[test]
    fn test_analysis_config_defaults() {
        let config = ConfigManager::from_config(Configuration::new()).get_analysis_config().unwrap();
        assert_eq!(config.settings.excluded_dirs, vec![".git".to_string()]);
        assert_eq!(config.parallel_threshold, 10);
        assert!(config.deadline.is_none());
    }

    #[test]
    fn test_invalid_analysis_config_fails_fast() {
        assert!(manager("[analysis]\nworkers = 0\n").get_analysis_config().is_err());
        assert!(manager("[analysis]\nexclude-dirs = [\"\"]\n").get_analysis_config().is_err());
        assert!(manager("[extractors]\n\".py\" = 3\n").get_analysis_config().is_err());
    }

    #[test]
    fn test_store_and_meta_settings() {
        let manager = manager(SAMPLE);
        assert_eq!(manager.get_database_path().unwrap(), PathBuf::from("/var/lib/gevol/metrics.db"));

        let meta = manager.get_meta_settings().unwrap();
        assert!(meta.enabled);
        assert_eq!(meta.token_env, "GEVOL_TOKEN");
        assert_eq!(meta.endpoint, GITHUB_GRAPHQL_ENDPOINT);
        assert_eq!(meta.timeout, Duration::from_secs(10));

        let defaults = ConfigManager::from_config(Configuration::new());
        assert!(defaults.get_database_path().unwrap().ends_with("gevol/metrics.db"));
        assert_eq!(defaults.get_meta_settings().unwrap(), MetaSettings::default());
        assert!(self::manager("[meta]\ntimeout-secs = 0\n").get_meta_settings().is_err());
    }

    #[test]
    fn test_config_file_loading() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(&temp_file, SAMPLE).unwrap();

        let manager = ConfigManager::load_from_file(temp_file.path().to_path_buf()).unwrap();
        assert_eq!(manager.config_file_path().unwrap(), temp_file.path());
        assert_eq!(manager.get_usize("analysis", "workers").unwrap(), Some(4));

        fs::write(&temp_file, "not = [valid").unwrap();
        assert!(ConfigManager::load_from_file(temp_file.path().to_path_buf()).is_err());
    }
}
