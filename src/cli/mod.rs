use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "dlpgate")]
#[command(about = "Data loss prevention gateway - scan stored objects and host files, gate reads on the results")]
#[command(version)]
pub struct Cli {
    /// Path to config file (falls back to environment variables when missing)
    #[arg(short, long, default_value = "dlpgate.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (storage events, webhooks, transforms)
    Serve {
        /// Override the listen address from the config
        #[arg(long)]
        listen: Option<String>,
    },
    /// Watch a directory tree and scan changed files
    Watch {
        /// Directory to watch (defaults to [watcher] path)
        path: Option<PathBuf>,
    },
    /// Submit a single local file for scanning
    Scan {
        file: PathBuf,
    },
    /// Show metric totals
    Metrics {
        /// Export every data point instead of totals
        #[arg(long)]
        export: bool,
        /// Export format
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Starter configuration written by `dlpgate init`.
pub const CONFIG_TEMPLATE: &str = include_str!("../../templates/dlpgate.toml");

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_watch_with_path() {
        let cli = Cli::try_parse_from(["dlpgate", "watch", "/srv/share"]).unwrap();
        match cli.command {
            Commands::Watch { path } => assert_eq!(path, Some(PathBuf::from("/srv/share"))),
            _ => panic!("expected watch"),
        }
        assert_eq!(cli.config, PathBuf::from("dlpgate.toml"));
    }

    #[test]
    fn parses_metrics_export_csv() {
        let cli =
            Cli::try_parse_from(["dlpgate", "-c", "x.toml", "metrics", "--export", "--format", "csv"])
                .unwrap();
        match cli.command {
            Commands::Metrics { export, format } => {
                assert!(export);
                assert_eq!(format, ExportFormat::Csv);
            }
            _ => panic!("expected metrics"),
        }
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(Cli::try_parse_from(["dlpgate", "metrics", "--format", "xml"]).is_err());
    }

    #[test]
    fn template_parses_with_placeholders_set() {
        let text = CONFIG_TEMPLATE
            .replace("${NIGHTFALL_API_KEY}", "key")
            .replace("${NIGHTFALL_SIGNING_SECRET}", "secret")
            .replace("${NIGHTFALL_POLICY_UUID}", "policy");
        let config = crate::config::AppConfig::from_toml(&text).unwrap();
        assert_eq!(config.nightfall.api_key, "key");
        assert_eq!(config.nightfall.policy_uuid.as_deref(), Some("policy"));
        assert_eq!(config.watcher.min_file_size, 8);
    }
}
