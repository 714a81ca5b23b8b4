//! Configuration for interpreter invocation, session protocol and logging
//!
//! Loaded from a TOML file or from environment variables layered over
//! defaults that target a stock Rakudo `perl6` install.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Placeholder for the sentinel token inside `print_template`.
pub const SENTINEL_PLACEHOLDER: &str = "{sentinel}";
/// Placeholder for the user body inside `wrapper_template`.
pub const BODY_PLACEHOLDER: &str = "{body}";
/// Placeholder for the result file path inside `wrapper_template`.
pub const OUT_FILE_PLACEHOLDER: &str = "{out_file}";

/// Default one-shot wrapper. The body becomes a sub, its return value is
/// kept in a scalar container so `.perl` reports itemized lists as `$[...]`
/// / `$(...)`, and Map-likes are gisted as `{k => v, ...}`.
pub const DEFAULT_WRAPPER_TEMPLATE: &str = r#"sub babel-main {
{body}
}
my $babel-result = babel-main();
my $babel-text = $babel-result ~~ Map ?? $babel-result.gist !! $babel-result.perl;
spurt '{out_file}', $babel-text ~ "\n";
"#;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file: {message}")]
    IoError { message: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BabelConfig {
    pub interpreter: InterpreterConfig,
    pub session: SessionConfig,
    pub external: ExternalConfig,
    pub logging: LoggingConfig,
}

/// How the interpreter is launched and spoken to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Executable name or path
    pub command: String,
    /// Arguments for one-shot runs (program read from stdin)
    pub args: Vec<String>,
    /// Arguments that start an interactive REPL on a pipe
    pub repl_args: Vec<String>,
    /// One-shot wrapper with `{body}` and `{out_file}` placeholders
    pub wrapper_template: String,
    /// Statement that prints `{sentinel}` on its own line
    pub print_template: String,
    /// Regex matching prompt text at the start of an output line
    pub prompt_pattern: String,
    /// End-of-evaluation marker
    pub sentinel: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            command: "perl6".to_string(),
            args: Vec::new(),
            repl_args: vec!["--repl-mode=interactive".to_string()],
            wrapper_template: DEFAULT_WRAPPER_TEMPLATE.to_string(),
            print_template: r#"say "{sentinel}";"#.to_string(),
            prompt_pattern: r"^(?:> |\* )+".to_string(),
            sentinel: "__babel_perl6_eoe__".to_string(),
        }
    }
}

impl InterpreterConfig {
    /// The statement that makes the interpreter print the sentinel.
    pub fn probe_statement(&self) -> String {
        self.print_template
            .replace(SENTINEL_PLACEHOLDER, &self.sentinel)
    }
}

/// Session protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on one sentinel-synchronized evaluation
    #[serde(with = "humantime_serde")]
    pub eval_timeout: Duration,
    /// Re-check interval while waiting for the sentinel
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Character wrapped around session ids to canonicalize them
    pub boundary_marker: char,
    /// Session name used when a session is requested without an id
    pub default_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            eval_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
            boundary_marker: '*',
            default_name: "perl6".to_string(),
        }
    }
}

/// One-shot evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// Wall-clock timeout; the process is killed when exceeded
    #[serde(with = "humantime_serde")]
    pub max_runtime: Duration,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            max_runtime: Duration::from_secs(60),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl BabelConfig {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(command) = env::var("PERL6_BABEL_COMMAND") {
            config.interpreter.command = command;
        }

        if let Ok(sentinel) = env::var("PERL6_BABEL_SENTINEL") {
            config.interpreter.sentinel = sentinel;
        }

        if let Ok(secs) = env::var("PERL6_BABEL_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PERL6_BABEL_TIMEOUT_SECS".to_string(),
                reason: "Invalid number of seconds".to_string(),
            })?;
            config.session.eval_timeout = Duration::from_secs(secs);
            config.external.max_runtime = Duration::from_secs(secs);
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.logging.level = log_level;
        }

        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let interpreter = &self.interpreter;

        if interpreter.command.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "interpreter.command".to_string(),
            });
        }

        if interpreter.sentinel.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "interpreter.sentinel".to_string(),
            });
        }

        if !interpreter.print_template.contains(SENTINEL_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue {
                key: "interpreter.print_template".to_string(),
                reason: format!("Must contain {}", SENTINEL_PLACEHOLDER),
            });
        }

        for placeholder in [BODY_PLACEHOLDER, OUT_FILE_PLACEHOLDER] {
            if !interpreter.wrapper_template.contains(placeholder) {
                return Err(ConfigError::InvalidValue {
                    key: "interpreter.wrapper_template".to_string(),
                    reason: format!("Must contain {}", placeholder),
                });
            }
        }

        if let Err(e) = regex::Regex::new(&interpreter.prompt_pattern) {
            return Err(ConfigError::InvalidValue {
                key: "interpreter.prompt_pattern".to_string(),
                reason: e.to_string(),
            });
        }

        if self.session.eval_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "session.eval_timeout".to_string(),
                reason: "Timeout must be > 0".to_string(),
            });
        }

        if self.session.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "session.poll_interval".to_string(),
                reason: "Poll interval must be > 0".to_string(),
            });
        }

        if self.external.max_runtime.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "external.max_runtime".to_string(),
                reason: "Timeout must be > 0".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: format!("Must be one of: {}", valid_levels.join(", ")),
            });
        }

        Ok(())
    }
}
