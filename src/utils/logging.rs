//! Logging Module
//!
//! Sets up `tracing` for the CLI. Events from this crate are shown at the
//! chosen level while Burn, the image decoders and other dependencies are
//! held back to warnings. `RUST_LOG` replaces the whole filter when set.

use std::str::FromStr;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Target prefix of every event emitted by the library and the CLI
pub const CRATE_TARGET: &str = "plantvillage_infer";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Level for this crate's events
    pub level: LogLevel,
    /// Level for events from dependencies
    pub dependency_level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            dependency_level: LogLevel::Warn,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug output for this crate, with module paths; dependencies at info
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            dependency_level: LogLevel::Info,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Warnings and errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Warn,
            dependency_level: LogLevel::Error,
            ..Self::default()
        }
    }

    /// Pick the configuration for the command-line flags
    ///
    /// `--verbose` and `--quiet` win over the level from the configuration file.
    pub fn for_cli(verbose: bool, quiet: bool, configured: LogLevel) -> Self {
        if verbose {
            Self::verbose()
        } else if quiet {
            Self::quiet()
        } else {
            Self {
                level: configured,
                ..Self::default()
            }
        }
    }

    /// Filter directives in `EnvFilter` syntax, e.g. `plantvillage_infer=info,warn`
    pub fn directives(&self) -> String {
        format!(
            "{}={},{}",
            CRATE_TARGET,
            self.level.as_str(),
            self.dependency_level.as_str()
        )
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level '{}' (expected trace, debug, info, warn or error)",
                other
            )),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter, String> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(config.directives())
            .map_err(|e| format!("Invalid log filter '{}': {}", config.directives(), e)),
    }
}

/// Initialize logging with the given configuration
///
/// Fails if a global subscriber has already been installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(build_filter(config)?)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!(" INFO ".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("Warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_cli_flags_override_configured_level() {
        assert_eq!(LogConfig::for_cli(true, false, LogLevel::Error), LogConfig::verbose());
        assert_eq!(LogConfig::for_cli(false, true, LogLevel::Trace), LogConfig::quiet());

        let config = LogConfig::for_cli(false, false, LogLevel::Debug);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.dependency_level, LogLevel::Warn);
    }

    #[test]
    fn test_directives_scope_level_to_crate() {
        assert_eq!(LogConfig::default().directives(), "plantvillage_infer=info,warn");
        assert_eq!(LogConfig::verbose().directives(), "plantvillage_infer=debug,info");
        assert_eq!(LogConfig::quiet().directives(), "plantvillage_infer=warn,error");
    }

    #[test]
    fn test_directives_parse_as_env_filter() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            let config = LogConfig::for_cli(false, false, level);
            assert!(EnvFilter::try_new(config.directives()).is_ok());
        }
    }
}
