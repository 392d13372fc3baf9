//! Configuration system for the chat relay server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. `PORT` environment variable (port only)
//! 2. CLI arguments (and their `RELAY_*` environment variables)
//! 3. TOML config file (`~/.config/chat-relay/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

/// Port used when nothing else specifies one.
pub const DEFAULT_PORT: u16 = 8787;

/// Environment variable that takes precedence over every other port source.
pub const PORT_ENV: &str = "PORT";

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The `PORT` environment variable is not a valid port number.
    #[error("invalid PORT value {value:?}: expected a number between 0 and 65535")]
    InvalidPort {
        /// The rejected value.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the relay.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    host: Option<String>,
    port: Option<u16>,
    max_message_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Room-scoped WebSocket chat relay")]
pub struct RelayCliArgs {
    /// Port to listen on (the `PORT` environment variable takes precedence).
    pub port: Option<u16>,

    /// Interface to bind to.
    #[arg(short = 'H', long, env = "RELAY_HOST")]
    pub host: Option<String>,

    /// Path to config file (default: `~/.config/chat-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Drop frames larger than this many bytes (default: no limit beyond
    /// the WebSocket transport's).
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAY_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Interface to bind to (e.g., `0.0.0.0`).
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum accepted frame size in bytes, if limited.
    pub max_message_size: Option<usize>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_message_size: None,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration by merging the `PORT` variable, CLI args, and a
    /// TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if `PORT` is set to something that is not a port.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let env_port = parse_env_port(std::env::var(PORT_ENV).ok().as_deref())?;
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, env_port, &file))
    }

    /// Address string suitable for [`tokio::net::TcpListener::bind`].
    #[must_use]
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Resolve a `RelayConfig` from the environment port, CLI args, and a
    /// parsed config file.
    ///
    /// Priority: `PORT` > CLI > file > default.
    #[must_use]
    fn resolve(cli: &RelayCliArgs, env_port: Option<u16>, file: &RelayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            host: cli
                .host
                .clone()
                .or_else(|| file.server.host.clone())
                .unwrap_or(defaults.host),
            port: env_port
                .or(cli.port)
                .or(file.server.port)
                .unwrap_or(defaults.port),
            max_message_size: cli
                .max_message_size
                .or(file.server.max_message_size)
                .or(defaults.max_message_size),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Parses the raw `PORT` value. Unset or empty means "not specified".
fn parse_env_port(raw: Option<&str>) -> Result<Option<u16>, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidPort {
                value: value.to_string(),
            }),
    }
}

/// Load and parse a TOML config file for the relay.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<RelayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(RelayConfigFile::default());
        };
        config_dir.join("chat-relay").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
