use crate::error::LogGuardError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the environment variables read by [`Config::apply_env_overrides`]
pub const ENV_PREFIX: &str = "LOGGUARD";

/// Main configuration for LogGuard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Ingestion sources configuration
    pub ingestion: IngestionConfig,

    /// Output targets configuration
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self, LogGuardError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LogGuardError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, LogGuardError> {
        toml::from_str(content)
            .map_err(|e| LogGuardError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, LogGuardError> {
        toml::to_string_pretty(self)
            .map_err(|e| LogGuardError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Overlay values from the process environment
    pub fn apply_process_env(&mut self) -> Result<(), LogGuardError> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay `LOGGUARD_*` values returned by `lookup` on top of this config.
    ///
    /// Recognized keys: `LOGGUARD_SHUTDOWN_TIMEOUT`, `LOGGUARD_LOG_LEVEL`,
    /// `LOGGUARD_INGESTION_STDIN_ENABLED`, `LOGGUARD_INGESTION_FILE_ENABLED`,
    /// `LOGGUARD_INGESTION_UNIX_ENABLED`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), LogGuardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| format!("{}_{}", ENV_PREFIX, name);

        if let Some(value) = lookup(&key("SHUTDOWN_TIMEOUT")) {
            self.general.shutdown_timeout = value.trim().parse().map_err(|_| {
                LogGuardError::Config(format!("Invalid {}: {}", key("SHUTDOWN_TIMEOUT"), value))
            })?;
        }

        if let Some(value) = lookup(&key("LOG_LEVEL")) {
            self.general.log_level = value.trim().to_lowercase();
        }

        let flags = [
            ("INGESTION_STDIN_ENABLED", &mut self.ingestion.stdin.enabled),
            ("INGESTION_FILE_ENABLED", &mut self.ingestion.file.enabled),
            ("INGESTION_UNIX_ENABLED", &mut self.ingestion.unix.enabled),
        ];
        for (name, slot) in flags {
            if let Some(value) = lookup(&key(name)) {
                *slot = parse_bool(&value)
                    .ok_or_else(|| LogGuardError::Config(format!("Invalid {}: {}", key(name), value)))?;
            }
        }

        Ok(())
    }

    /// Reject values the ingestion layer cannot run with
    pub fn validate(&self) -> Result<(), LogGuardError> {
        if self.general.shutdown_timeout == 0 {
            return Err(LogGuardError::Config("invalid shutdown timeout".to_string()));
        }

        if self.general.buffer_size == 0 || self.general.error_buffer_size == 0 {
            return Err(LogGuardError::Config(
                "channel buffer sizes must be greater than zero".to_string(),
            ));
        }

        for pattern in &self.ingestion.file.paths {
            if !is_glob_pattern(pattern) && !Path::new(pattern).exists() {
                return Err(LogGuardError::Config(format!(
                    "file path not found: {}",
                    pattern
                )));
            }
        }

        for socket in &self.ingestion.unix.sockets {
            if socket.address.trim().is_empty() {
                return Err(LogGuardError::Config(
                    "unix socket address cannot be empty".to_string(),
                ));
            }
            if socket.timeout_ms == 0 || socket.read_deadline_ms == 0 {
                return Err(LogGuardError::Config(format!(
                    "invalid timeout for unix socket {}",
                    socket.address
                )));
            }
            if socket.max_message_size == 0 {
                return Err(LogGuardError::Config(format!(
                    "invalid max_message_size for unix socket {}",
                    socket.address
                )));
            }
            if socket.mode == SocketMode::Listen && socket.max_connections == 0 {
                return Err(LogGuardError::Config(format!(
                    "invalid max_connections for unix socket {}",
                    socket.address
                )));
            }
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whether `path` contains glob metacharacters
pub fn is_glob_pattern(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instance name for identification
    pub instance_name: String,

    /// Internal log level: trace, debug, info, warn, error
    pub log_level: String,

    /// Capacity of the shared event channel
    pub buffer_size: usize,

    /// Capacity of the shared error channel
    pub error_buffer_size: usize,

    /// Seconds to wait for sources to release their resources on shutdown
    pub shutdown_timeout: u64,
}

impl GeneralConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance_name: "logguard".to_string(),
            log_level: "warn".to_string(),
            buffer_size: 100,
            error_buffer_size: 10,
            shutdown_timeout: 5,
        }
    }
}

/// Ingestion sources configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Stdin ingestion
    pub stdin: StdinConfig,

    /// File watching ingestion
    pub file: FileConfig,

    /// Unix socket ingestion
    pub unix: UnixConfig,
}

/// Stdin ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StdinConfig {
    pub enabled: bool,
}

impl Default for StdinConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// File watching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    /// Paths or glob patterns to watch
    pub paths: Vec<String>,
    /// Glob patterns of files to skip
    pub ignore: Vec<String>,
}

/// Unix socket ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnixConfig {
    pub enabled: bool,
    pub sockets: Vec<UnixSocketConfig>,
}

/// How a socket source obtains its connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketMode {
    /// Connect to an existing listener
    #[default]
    Dial,
    /// Bind the address and accept clients
    Listen,
}

/// A single unix socket endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnixSocketConfig {
    /// Filesystem path of the socket
    pub address: String,
    pub mode: SocketMode,
    /// Connect timeout in milliseconds
    pub timeout_ms: u64,
    /// Rolling per-read deadline in milliseconds
    pub read_deadline_ms: u64,
    /// Longest accepted line, in bytes
    pub max_message_size: usize,
    /// Concurrent clients accepted in listen mode
    pub max_connections: usize,
}

impl UnixSocketConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }
}

impl Default for UnixSocketConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            mode: SocketMode::Dial,
            timeout_ms: 1_000,
            read_deadline_ms: 5_000,
            max_message_size: 1024 * 1024,
            max_connections: 100,
        }
    }
}

/// Output targets configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Stdout output
    pub stdout: StdoutConfig,
}

/// Stdout output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StdoutConfig {
    pub enabled: bool,
    /// Format: pretty, json, raw
    pub format: String,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.instance_name, "logguard");
        assert_eq!(config.general.buffer_size, 100);
        assert_eq!(config.general.error_buffer_size, 10);
        assert_eq!(config.general.shutdown_timeout(), Duration::from_secs(5));
        assert!(config.ingestion.stdin.enabled);
        assert!(!config.ingestion.file.enabled);
        assert!(!config.ingestion.unix.enabled);
        assert!(config.output.stdout.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
[general]
instance_name = "my-logguard"
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.general.instance_name, "my-logguard");
        // Defaults should be applied
        assert_eq!(config.general.buffer_size, 100);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[general]
instance_name = "prod-logguard"
log_level = "debug"
buffer_size = 500
shutdown_timeout = 15

[ingestion.stdin]
enabled = false

[ingestion.file]
enabled = true
paths = ["/var/log/app/*.log"]
ignore = ["*.tmp"]

[ingestion.unix]
enabled = true

[[ingestion.unix.sockets]]
address = "/var/run/app.sock"
timeout_ms = 30

[[ingestion.unix.sockets]]
address = "/var/run/collector.sock"
mode = "listen"
max_connections = 4

[output.stdout]
format = "json"
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.general.instance_name, "prod-logguard");
        assert_eq!(config.general.buffer_size, 500);
        assert_eq!(config.general.shutdown_timeout, 15);
        assert!(!config.ingestion.stdin.enabled);
        assert_eq!(config.ingestion.file.paths, vec!["/var/log/app/*.log"]);
        assert_eq!(config.ingestion.file.ignore, vec!["*.tmp"]);

        let sockets = &config.ingestion.unix.sockets;
        assert_eq!(sockets.len(), 2);
        assert_eq!(sockets[0].mode, SocketMode::Dial);
        assert_eq!(sockets[0].timeout(), Duration::from_millis(30));
        assert_eq!(sockets[0].max_message_size, 1024 * 1024);
        assert_eq!(sockets[1].mode, SocketMode::Listen);
        assert_eq!(sockets[1].max_connections, 4);
        assert_eq!(config.output.stdout.format, "json");
    }

    #[test]
    fn test_serialize_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("shutdown_timeout"));
    }

    #[test]
    fn test_validate_rejects_zero_shutdown_timeout() {
        let mut config = Config::default();
        config.general.shutdown_timeout = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid shutdown timeout"));
    }

    #[test]
    fn test_validate_file_paths() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("app.log");
        std::fs::write(&existing, "").unwrap();

        let mut config = Config::default();
        config.ingestion.file.paths = vec![
            existing.to_string_lossy().to_string(),
            format!("{}/*.log", dir.path().display()),
        ];
        assert!(config.validate().is_ok());

        config.ingestion.file.paths.push("/non/existent/path.log".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("/non/existent/path.log"));
    }

    #[test]
    fn test_validate_sockets() {
        let mut config = Config::default();
        config.ingestion.unix.sockets.push(UnixSocketConfig {
            address: "/tmp/app.sock".to_string(),
            ..Default::default()
        });
        assert!(config.validate().is_ok());

        config.ingestion.unix.sockets[0].timeout_ms = 0;
        assert!(config.validate().is_err());

        config.ingestion.unix.sockets[0].timeout_ms = 10;
        config.ingestion.unix.sockets[0].max_connections = 0;
        assert!(config.validate().is_ok());

        config.ingestion.unix.sockets[0].mode = SocketMode::Listen;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_connections"));

        config.ingestion.unix.sockets[0].max_connections = 1;
        config.ingestion.unix.sockets[0].address = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                ("LOGGUARD_SHUTDOWN_TIMEOUT", "15"),
                ("LOGGUARD_INGESTION_FILE_ENABLED", "true"),
                ("LOGGUARD_INGESTION_STDIN_ENABLED", "0"),
                ("LOGGUARD_LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();

        assert_eq!(config.general.shutdown_timeout, 15);
        assert_eq!(config.general.log_level, "debug");
        assert!(config.ingestion.file.enabled);
        assert!(!config.ingestion.stdin.enabled);
        assert!(!config.ingestion.unix.enabled);
    }

    #[test]
    fn test_env_overrides_reject_garbage() {
        let mut config = Config::default();
        assert!(config
            .apply_env_overrides(env(&[("LOGGUARD_SHUTDOWN_TIMEOUT", "soon")]))
            .is_err());
        assert!(config
            .apply_env_overrides(env(&[("LOGGUARD_INGESTION_UNIX_ENABLED", "maybe")]))
            .is_err());
    }

    #[test]
    fn test_glob_detection() {
        assert!(is_glob_pattern("/var/log/*.log"));
        assert!(is_glob_pattern("/var/log/app-?.log"));
        assert!(!is_glob_pattern("/var/log/app.log"));
    }
}
