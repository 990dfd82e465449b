//! Application initialization and configuration

use anyhow::{Result, Context};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, warn, LevelFilter};
use crate::{cli, config, logging};
use crate::meta::{GithubMetaSource, MetaError, MetaSource};
use crate::scanner::config::AnalysisConfig;
use crate::store::SqliteStore;

pub fn load_configuration(args: &cli::Args) -> Result<config::ConfigManager> {
    let mut manager = if let Some(config_file) = &args.config_file {
        debug!("Loading configuration from explicit file: {}", config_file.display());
        config::ConfigManager::load_from_file(config_file.clone())?
    } else {
        config::ConfigManager::load()?
    };

    if let Some(section_name) = &args.config_name {
        manager.select_section(section_name.clone());
    }

    Ok(manager)
}

/// CLI flags first, then `[base]` keys `console-level`, `log-format`,
/// `log-file` and `file-log-level`
pub fn configure_logging(args: &cli::Args, config: &config::ConfigManager) -> Result<logging::LogConfig> {
    let console_level = if args.debug {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        config.get_log_level("base", "console-level")?.unwrap_or(LevelFilter::Info)
    };

    let format = match args.log_format.clone().or(config.get_string("base", "log-format")?) {
        Some(format) => logging::LogFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))?,
        None => logging::LogFormat::Text,
    };

    let log_file = match &args.log_file {
        Some(path) => Some(path.clone()),
        None => config.get_path("base", "log-file")?,
    };

    let file_level = match &args.log_file_level {
        Some(level) => Some(logging::parse_log_level(level)?),
        None => config.get_log_level("base", "file-log-level")?,
    };

    let (destination, file_level) = match log_file {
        Some(path) => (logging::LogDestination::Both(path), Some(file_level.unwrap_or(console_level))),
        None => {
            if file_level.is_some() {
                return Err(anyhow::anyhow!("Log file level specified without log file"));
            }
            (logging::LogDestination::Console, None)
        }
    };

    Ok(logging::LogConfig {
        console_level,
        file_level,
        format,
        destination,
    })
}

/// Config file values overridden by `analyse` flags
pub fn build_analysis_config(args: &cli::AnalyseArgs, config: &config::ConfigManager) -> Result<AnalysisConfig> {
    let mut analysis = config.get_analysis_config()?;

    if let Some(workers) = args.workers {
        analysis.workers = workers;
    }
    if let Some(threshold) = args.threshold {
        analysis.parallel_threshold = threshold;
    }
    if let Some(secs) = args.deadline {
        analysis.deadline = Some(Duration::from_secs(secs));
    }
    analysis.settings.excluded_dirs.extend(args.exclude_dir.iter().cloned());
    analysis.settings.excluded_extensions.extend(args.exclude_ext.iter().cloned());

    analysis.validate().context("Invalid analysis options")?;
    debug!("Analysis configuration: {:?}", analysis);
    Ok(analysis)
}

pub fn open_store(args: &cli::AnalyseArgs, config: &config::ConfigManager) -> Result<SqliteStore> {
    let path = match &args.database {
        Some(path) => path.clone(),
        None => config.get_database_path()?,
    };
    SqliteStore::open(&path).with_context(|| format!("Failed to open metric database {}", path.display()))
}

/// Issue tracker source, or None when meta-analysis is disabled or no token is set
pub fn create_meta_source(args: &cli::AnalyseArgs, config: &config::ConfigManager) -> Result<Option<Arc<dyn MetaSource>>> {
    let settings = config.get_meta_settings()?;
    if args.no_meta || !settings.enabled {
        debug!("Meta-analysis disabled");
        return Ok(None);
    }

    match GithubMetaSource::from_env(&settings.token_env, settings.endpoint, settings.timeout) {
        Ok(source) => Ok(Some(Arc::new(source))),
        Err(MetaError::MissingToken(var)) => {
            warn!("{var} is not set; skipping issue and pull request metrics");
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to create issue tracker client"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(argv: &[&str]) -> cli::Args {
        cli::Args::try_parse_from(argv).unwrap()
    }

    fn analyse_args(args: &cli::Args) -> cli::AnalyseArgs {
        match &args.command {
            cli::Command::Analyse(analyse) => analyse.clone().apply_enhanced_parsing(),
            cli::Command::Worker => panic!("expected analyse"),
        }
    }

    fn empty_config() -> config::ConfigManager {
        config::ConfigManager::from_config(config::Configuration::new())
    }

    #[test]
    fn test_logging_from_flags() {
        let log = configure_logging(&parse(&["gevol", "-v", "worker"]), &empty_config()).unwrap();
        assert_eq!(log.console_level, LevelFilter::Debug);
        assert_eq!(log.destination, logging::LogDestination::Console);

        let log = configure_logging(
            &parse(&["gevol", "--log-file", "/tmp/gevol.log", "--log-format", "json", "worker"]),
            &empty_config(),
        )
        .unwrap();
        assert_eq!(log.format, logging::LogFormat::Json);
        assert_eq!(log.destination, logging::LogDestination::Both(PathBuf::from("/tmp/gevol.log")));
        assert_eq!(log.file_level, Some(LevelFilter::Info));
    }

    #[test]
    fn test_analysis_flags_override_config() {
        let args = parse(&["gevol", "analyse", "o/n", "-w", "3", "-t", "7", "-X", "vendor", "--deadline", "60"]);
        let config = analyse_args(&args);
        let analysis = build_analysis_config(&config, &empty_config()).unwrap();

        assert_eq!(analysis.workers, 3);
        assert_eq!(analysis.parallel_threshold, 7);
        assert_eq!(analysis.deadline, Some(Duration::from_secs(60)));
        assert_eq!(analysis.settings.excluded_dirs, vec![".git".to_string(), "vendor".to_string()]);
    }

    #[test]
    fn test_no_meta_disables_source() {
        let args = parse(&["gevol", "analyse", "o/n", "--no-meta"]);
        assert!(create_meta_source(&analyse_args(&args), &empty_config()).unwrap().is_none());
    }

    #[test]
    fn test_store_opens_at_database_flag() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("db").join("metrics.db");
        let args = parse(&["gevol", "analyse", "o/n", "--database", path.to_str().unwrap()]);
        open_store(&analyse_args(&args), &empty_config()).unwrap();
        assert!(path.exists());
    }
}
