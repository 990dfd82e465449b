use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use anyhow::Result;
use std::path::PathBuf;
use log::debug;

/// Software evolution metrics for git repositories
#[derive(Parser, Debug)]
#[command(name = "gevol")]
#[command(about = "Incremental per-commit code metrics correlated with issue and pull request activity")]
#[command(version)]
pub struct Args {
    /// Verbose output (debug level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug output (trace level logging)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Log file path for file output
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_file_level: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Configuration section name
    #[arg(long, value_name = "SECTION", global = true)]
    pub config_name: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyse commits not yet stored for a repository and print its metric points
    #[command(alias = "analyze")]
    Analyse(AnalyseArgs),

    /// Analyse one partition read from stdin (spawned by the dispatcher)
    #[command(hide = true)]
    Worker,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AnalyseArgs {
    /// Repository identity: owner/name or a GitHub URL
    #[arg(value_name = "REPOSITORY")]
    pub repository: String,

    /// Local clone of the repository (defaults to the current directory)
    #[arg(short = 'p', long = "path", value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Number of worker processes for large histories
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Use workers only when more than N commits are new
    #[arg(short = 't', long = "threshold", value_name = "N")]
    pub threshold: Option<usize>,

    /// Excluded directory prefix (repeatable, comma-separated values allowed)
    #[arg(short = 'X', long = "exclude-dir", value_name = "DIR", action = ArgAction::Append)]
    pub exclude_dir: Vec<String>,

    /// Excluded path suffix (repeatable, comma-separated values allowed)
    #[arg(short = 'N', long = "exclude-ext", value_name = "SUFFIX", action = ArgAction::Append)]
    pub exclude_ext: Vec<String>,

    /// Write points to this file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Metric database path
    #[arg(long = "database", value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Abort the run after this many seconds
    #[arg(long = "deadline", value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Skip issue and pull request analysis
    #[arg(long = "no-meta")]
    pub no_meta: bool,

    /// Print the full report instead of only the points
    #[arg(long = "report")]
    pub report: bool,
}

impl AnalyseArgs {
    /// Split comma-separated exclusion values and drop blanks
    pub fn apply_enhanced_parsing(mut self) -> Self {
        self.exclude_dir = split_values(self.exclude_dir);
        self.exclude_ext = split_values(self.exclude_ext);
        self
    }
}

fn split_values(values: Vec<String>) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    let mut args = Args::parse();
    if let Command::Analyse(analyse) = &mut args.command {
        *analyse = analyse.clone().apply_enhanced_parsing();
    }
    debug!("Parsed CLI arguments: {:?}", args);
    args
}

/// Validate CLI argument combinations
pub fn validate_args(args: &Args) -> Result<()> {
    let log_flags_count = [args.verbose, args.quiet, args.debug]
        .iter()
        .filter(|&&flag| flag)
        .count();
    if log_flags_count > 1 {
        return Err(anyhow::anyhow!("Only one of --verbose, --quiet or --debug may be given"));
    }

    if args.log_file_level.is_some() && args.log_file.is_none() {
        return Err(anyhow::anyhow!("--log-file-level requires --log-file"));
    }

    if let Command::Analyse(analyse) = &args.command {
        if analyse.workers == Some(0) {
            return Err(anyhow::anyhow!("--workers must be greater than zero"));
        }
        if analyse.deadline == Some(0) {
            return Err(anyhow::anyhow!("--deadline must be greater than zero"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    fn analyse(args: Args) -> AnalyseArgs {
        match args.command {
            Command::Analyse(analyse) => analyse.apply_enhanced_parsing(),
            other => panic!("expected analyse, got {other:?}"),
        }
    }

    #[test]
    fn test_analyse_arguments() {
        let args = analyse(parse(&[
            "gevol", "analyse", "octo/demo", "--path", "/src/demo", "-w", "4", "--threshold", "20",
            "-X", "node_modules,vendor", "-X", "build", "--exclude-ext", ".min.js", "--no-meta",
        ]));

        assert_eq!(args.repository, "octo/demo");
        assert_eq!(args.path, Some(PathBuf::from("/src/demo")));
        assert_eq!(args.workers, Some(4));
        assert_eq!(args.threshold, Some(20));
        assert_eq!(args.exclude_dir, vec!["node_modules", "vendor", "build"]);
        assert_eq!(args.exclude_ext, vec![".min.js"]);
        assert!(args.no_meta);
        assert!(args.output.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["gevol", "analyse", "octo/demo", "--verbose", "--log-format", "json"]);
        assert!(args.verbose);
        assert_eq!(args.log_format.as_deref(), Some("json"));
    }

    #[test]
    fn test_worker_subcommand_and_alias() {
        assert!(matches!(parse(&["gevol", "worker"]).command, Command::Worker));
        assert!(matches!(parse(&["gevol", "analyze", "octo/demo"]).command, Command::Analyse(_)));
        assert!(Args::try_parse_from(["gevol"]).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(validate_args(&parse(&["gevol", "analyse", "o/n"])).is_ok());
        assert!(validate_args(&parse(&["gevol", "-v", "-q", "analyse", "o/n"])).is_err());
        assert!(validate_args(&parse(&["gevol", "--log-file-level", "debug", "worker"])).is_err());
        assert!(validate_args(&parse(&["gevol", "analyse", "o/n", "--workers", "0"])).is_err());
        assert!(validate_args(&parse(&["gevol", "analyse", "o/n", "--deadline", "0"])).is_err());
    }
}
