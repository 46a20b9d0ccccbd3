use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cos_config::ToolConfig;
use cos_core::{Dialect, ct_debug};

mod cmd_transform;
mod cmd_validate;
mod cmd_validate_config;
mod tracing_init;

#[derive(Parser)]
#[command(
    name = "cos-tool",
    about = "Validates Prometheus and Loki expressions, adds Juju topology to label matchers"
)]
struct Cli {
    /// Query dialect, `promql` or `logql` [default: promql]
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Path to a cos-tool.toml config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inject label matchers into every selector of an expression
    #[command(visible_alias = "t")]
    Transform {
        /// The expression to transform
        #[arg(allow_hyphen_values = true)]
        expr: String,

        /// Label matcher to inject, in KEY=VALUE format
        #[arg(long = "label-matcher")]
        label_matchers: Vec<String>,
    },

    /// Validate alerting and recording rule files
    #[command(visible_aliases = ["v", "lint", "l"])]
    Validate {
        /// Rule files or glob patterns (e.g. "rules/*.yaml")
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Validate a Prometheus configuration file
    ValidateConfig {
        /// Path to the configuration file
        file: PathBuf,
    },
}

impl Cli {
    /// The `--format` flag when given, otherwise the config file's default.
    fn dialect(&self, config: &ToolConfig) -> Dialect {
        match &self.format {
            Some(flag) => Dialect::from_flag(flag),
            None => Dialect::from(config.format),
        }
    }
}

/// Load the tool config and the directory relative paths in it resolve from.
fn load_config(path: Option<&Path>) -> Result<(ToolConfig, PathBuf)> {
    let cwd = std::env::current_dir()?;
    let Some(path) = path else {
        return Ok((ToolConfig::default(), cwd));
    };
    let config = ToolConfig::load(path)?;
    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => cwd,
    };
    Ok((config, base_dir))
}

/// Every local, including the log writer guard, is dropped before the exit
/// code reaches the process, so buffered log lines are flushed.
fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, base_dir) = load_config(cli.config.as_deref())?;
    let _guard = tracing_init::init_tracing(&config.logging, &base_dir)?;
    let dialect = cli.dialect(&config);
    ct_debug!(sys, ?dialect, "cos-tool started");

    match cli.command {
        Commands::Transform {
            expr,
            label_matchers,
        } => {
            cmd_transform::run(dialect, &config, expr, label_matchers)?;
        }

        Commands::Validate { files } => {
            if !cmd_validate::run(dialect, files)? {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::ValidateConfig { file } => {
            cmd_validate_config::run(dialect, file)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use cos_config::QueryFormat;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn transform_arguments() {
        let cli = parse(&[
            "cos-tool",
            "--format",
            "logql",
            "transform",
            "--label-matcher",
            "a=b",
            "--label-matcher",
            "c=d",
            "{job=\"x\"}",
        ]);
        match cli.command {
            Commands::Transform {
                expr,
                label_matchers,
            } => {
                assert_eq!(expr, "{job=\"x\"}");
                assert_eq!(label_matchers, vec!["a=b", "c=d"]);
            }
            _ => panic!("expected transform"),
        }
    }

    #[test]
    fn transform_takes_exactly_one_expression() {
        assert!(Cli::try_parse_from(["cos-tool", "transform"]).is_err());
        assert!(Cli::try_parse_from(["cos-tool", "transform", "up", "down"]).is_err());
    }

    #[test]
    fn subcommand_aliases() {
        for alias in ["validate", "v", "lint", "l"] {
            let cli = parse(&["cos-tool", alias, "a.yaml", "b/*.yaml"]);
            assert!(matches!(cli.command, Commands::Validate { ref files } if files.len() == 2));
        }
        assert!(matches!(
            parse(&["cos-tool", "t", "up"]).command,
            Commands::Transform { .. }
        ));
        assert!(matches!(
            parse(&["cos-tool", "validate-config", "prometheus.yml"]).command,
            Commands::ValidateConfig { .. }
        ));
        assert!(Cli::try_parse_from(["cos-tool", "validate"]).is_err());
    }

    #[test]
    fn format_flag_position_and_fallback() {
        let cli = parse(&["cos-tool", "v", "-f", "LOGQL", "a.yaml"]);
        assert_eq!(cli.dialect(&ToolConfig::default()), Dialect::LogQl);

        let cli = parse(&["cos-tool", "-f", "nonsense", "v", "a.yaml"]);
        assert_eq!(cli.dialect(&ToolConfig::default()), Dialect::PromQl);

        let config = ToolConfig {
            format: QueryFormat::Logql,
            ..ToolConfig::default()
        };
        let cli = parse(&["cos-tool", "v", "a.yaml"]);
        assert_eq!(cli.dialect(&config), Dialect::LogQl);
        let cli = parse(&["cos-tool", "-f", "promql", "v", "a.yaml"]);
        assert_eq!(cli.dialect(&config), Dialect::PromQl);
    }

    #[test]
    fn config_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cos-tool.toml");
        std::fs::write(&path, "format = \"logql\"\n").unwrap();
        let (config, base) = load_config(Some(&path)).unwrap();
        assert_eq!(config.format, QueryFormat::Logql);
        assert_eq!(base, dir.path());

        let (config, _) = load_config(None).unwrap();
        assert_eq!(config.format, QueryFormat::Promql);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
