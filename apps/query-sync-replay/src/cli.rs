use std::path::PathBuf;

use clap::Parser;
use query_sync::EngineConfig;

use crate::telemetry::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "query-sync-replay")]
#[command(about = "Replay navigation and view interactions against the query-sync engine")]
pub struct Cli {
    /// JSON replay script
    pub script: PathBuf,

    /// Page size for the table view (overrides QUERY_SYNC_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<u64>,

    /// Only print the report of the last step
    #[arg(long)]
    pub last: bool,

    /// Emit one JSON object per line instead of pretty output
    #[arg(long)]
    pub compact: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn, env = "QUERY_SYNC_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Write logs to a file instead of stderr
    #[arg(long, env = "QUERY_SYNC_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            file: self.log_file.clone(),
        }
    }

    /// Environment config with command-line overrides applied.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(page_size) = self.page_size.filter(|size| *size > 0) {
            config.default_page_size = page_size;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "query-sync-replay",
            "script.json",
            "--page-size",
            "5",
            "--log-level",
            "debug",
            "--compact",
        ])
        .unwrap();
        assert_eq!(cli.script, PathBuf::from("script.json"));
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(cli.compact);
        assert!(!cli.last);
        assert_eq!(cli.engine_config().default_page_size, 5);
    }

    #[test]
    fn zero_page_size_is_ignored() {
        let cli = Cli::try_parse_from(["query-sync-replay", "s.json", "--page-size", "0"]).unwrap();
        assert!(cli.engine_config().default_page_size > 0);
    }
}
