use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug information
    Debug,
    /// Detailed trace information
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "olapgate")]
#[command(about = "HTTP gateway translating legacy OLAP queries to SQL")]
#[command(version)]
pub struct Cli {
    /// Set log level (off, error, warn, info, debug, trace).
    /// RUST_LOG takes precedence when set.
    #[arg(short = 'l', long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file path (defaults built in when omitted)
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Override the listen address from the config file
    #[arg(long)]
    pub listen: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["olapgate"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(cli.config.is_none());
        assert!(cli.listen.is_none());
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::try_parse_from([
            "olapgate",
            "-l",
            "trace",
            "-C",
            "/etc/olapgate.toml",
            "--listen",
            "127.0.0.1:9000",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Trace);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/olapgate.toml")));
        assert_eq!(cli.listen.as_deref(), Some("127.0.0.1:9000"));
    }

    #[test]
    fn test_level_filter_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::Off), LevelFilter::OFF);
    }
}
