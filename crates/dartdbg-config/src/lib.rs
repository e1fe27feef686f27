//! Configuration for the dartdbg frame engine.
//!
//! The config is loaded from TOML (`dartdbg.toml`); every key is optional and
//! unknown keys are rejected. [`init_tracing`] installs the process-wide
//! `tracing` subscriber described by [`LoggingConfig`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a source snippet; keep just the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(deny_unknown_fields)]
pub struct DebuggerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub data_view: DataViewConfig,
    #[serde(default)]
    pub vm_service: VmServiceConfig,
    #[serde(default)]
    pub frames: FramesConfig,
}

impl DebuggerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: DebuggerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vm_service.reply_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "vm_service.reply_timeout_ms",
                message: "must be greater than zero".to_owned(),
            });
        }
        if self.vm_service.pending_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "vm_service.pending_capacity",
                message: "must be greater than zero".to_owned(),
            });
        }
        if self.frames.max_cached_frames == 0 {
            return Err(ConfigError::Invalid {
                key: "frames.max_cached_frames",
                message: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

/// JSON schema for `dartdbg.toml`, for editor tooling.
#[must_use]
pub fn json_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(DebuggerConfig);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level, or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path.
    ///
    /// If the file cannot be opened, file logging is disabled while other sinks
    /// remain active.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// `level` as filter directives. Bare level names are matched
    /// case-insensitively; anything else is passed through as written.
    pub(crate) fn level_directives(&self) -> String {
        let level = self.level.trim();
        if level.is_empty() {
            return Self::default_level();
        }
        let lower = level.to_ascii_lowercase();
        match lower.as_str() {
            "warning" => "warn".to_owned(),
            "trace" | "debug" | "info" | "warn" | "error" => lower,
            _ => level.to_owned(),
        }
    }

    /// `RUST_LOG` directives are appended to the configured ones and win on
    /// conflict. Unparsable input falls back to the next candidate, then to
    /// `info`.
    pub fn env_filter(&self) -> EnvFilter {
        let configured = self.level_directives();
        let candidates = match std::env::var("RUST_LOG") {
            Ok(env) if !env.trim().is_empty() => {
                let env = env.trim();
                vec![format!("{configured},{env}"), env.to_owned(), configured]
            }
            _ => vec![configured],
        };
        candidates
            .iter()
            .find_map(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

/// How auto-expression watch rows are discovered around the paused line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AutoExpressionStrategy {
    /// Never propose candidates; the auto-watch group stays empty.
    #[default]
    None,
    /// Propose dotted member accesses rooted at a visible variable.
    MemberAccess,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(deny_unknown_fields)]
pub struct DataViewConfig {
    /// Append the auto-watch group to every expanded frame.
    #[serde(default)]
    pub auto_expressions: bool,
    #[serde(default)]
    pub auto_expression_strategy: AutoExpressionStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(deny_unknown_fields)]
pub struct VmServiceConfig {
    /// How long an inspection request may wait for its reply.
    #[serde(default = "VmServiceConfig::default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// Capacity of the outgoing request queue handed to the transport.
    #[serde(default = "VmServiceConfig::default_pending_capacity")]
    pub pending_capacity: usize,
}

impl VmServiceConfig {
    fn default_reply_timeout_ms() -> u64 {
        10_000
    }

    fn default_pending_capacity() -> usize {
        256
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl Default for VmServiceConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: Self::default_reply_timeout_ms(),
            pending_capacity: Self::default_pending_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(deny_unknown_fields)]
pub struct FramesConfig {
    /// Upper bound on frame identities remembered by the node registry.
    #[serde(default = "FramesConfig::default_max_cached_frames")]
    pub max_cached_frames: usize,
}

impl FramesConfig {
    fn default_max_cached_frames() -> usize {
        1_024
    }
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            max_cached_frames: Self::default_max_cached_frames(),
        }
    }
}

/// Writer combining the configured sinks. The second value is set when the
/// log file could not be opened and file logging was dropped.
fn log_writer(config: &LoggingConfig) -> (BoxMakeWriter, bool) {
    let file = config.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let file_open_failed = config.file.is_some() && file.is_none();

    let mut writer = BoxMakeWriter::new(io::sink);
    if config.stderr {
        // `cargo test` only captures output written through the test writer.
        writer = if cfg!(debug_assertions) {
            BoxMakeWriter::new(writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr))
        } else {
            BoxMakeWriter::new(writer.and(io::stderr))
        };
    }
    if let Some(file) = file {
        // `&File` is `Write`, so appends go straight through a shared handle.
        writer = BoxMakeWriter::new(writer.and(Arc::new(file)));
    }
    (writer, file_open_failed)
}

static TRACING_INIT: Once = Once::new();

/// Initializes structured `tracing` logging.
///
/// Safe to call multiple times; only the first call installs a global
/// subscriber. Returns `true` when this call installed it.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let mut installed = false;
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();
        let (make_writer, file_open_failed) = log_writer(config);

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            installed = true;
            if file_open_failed {
                if let Some(path) = config.file.as_ref() {
                    tracing::warn!(
                        target: "dartdbg.config",
                        path = %path.display(),
                        "failed to open log file; file logging disabled"
                    );
                }
            }
        }
    });
    installed
}
