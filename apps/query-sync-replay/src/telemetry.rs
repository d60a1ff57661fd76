use clap::ValueEnum;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "QUERY_SYNC_LOG_FILTER";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config.level.to_filter()))
        .with_level(true)
        .with_target(config.level >= LogLevel::Debug)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;
    let _ = GUARD.set(guard);
    Ok(())
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    match std::env::var(LOG_FILTER_ENV) {
        Ok(filter) => EnvFilter::new(filter),
        Err(_) => EnvFilter::new(default_filter_for(level)),
    }
}

/// Engine crates follow the requested level; everything else stays at warn.
fn default_filter_for(level: LevelFilter) -> String {
    if level <= LevelFilter::WARN {
        return level.to_string().to_lowercase();
    }
    let level = level.to_string().to_lowercase();
    [
        "history_nav",
        "query_sync",
        "query_sync_replay",
    ]
    .iter()
    .fold("warn".to_string(), |mut filter, target| {
        filter.push_str(&format!(",{target}={level}"));
        filter
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_levels_apply_globally() {
        assert_eq!(default_filter_for(LevelFilter::WARN), "warn");
        assert_eq!(default_filter_for(LevelFilter::ERROR), "error");
    }

    #[test]
    fn verbose_levels_are_scoped_to_engine_targets() {
        let filter = default_filter_for(LevelFilter::DEBUG);
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("query_sync=debug"));
        assert!(filter.contains("history_nav=debug"));
    }
}
