use crate::error::EventError;
use crate::id::IdGenerator;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;

/// Free-form metadata attached to a log event
pub type Metadata = HashMap<String, serde_json::Value>;

/// Log severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Info
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "FATAL" => Ok(Severity::Fatal),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

fn severity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(DEBUG|INFO|WARNING|ERROR|FATAL)\b").expect("severity pattern is valid")
    })
}

/// Extract the first whole-word severity name appearing in `message`
pub fn parse_severity(message: &str) -> Option<Severity> {
    severity_regex()
        .find(message)
        .and_then(|m| m.as_str().parse().ok())
}

/// Origin of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Stdin,
    File,
    UnixSocket,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Stdin => write!(f, "stdin"),
            SourceKind::File => write!(f, "file"),
            SourceKind::UnixSocket => write!(f, "unix-socket"),
        }
    }
}

/// Normalized log record produced by every ingestion source.
///
/// `id` and `timestamp` are assigned once by [`LogEvent::new`] and cannot be
/// changed afterwards. Only the metadata map is mutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct LogEvent {
    id: String,
    timestamp: DateTime<Utc>,
    source: SourceKind,
    severity: Severity,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
}

/// Decoded JSON form of a [`LogEvent`], checked before it becomes one
#[derive(Deserialize)]
struct EventRecord {
    id: String,
    timestamp: DateTime<Utc>,
    source: SourceKind,
    severity: Severity,
    message: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl TryFrom<EventRecord> for LogEvent {
    type Error = EventError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        if record.message.is_empty() {
            return Err(EventError::EmptyMessage);
        }

        Ok(Self {
            id: record.id,
            timestamp: record.timestamp,
            source: record.source,
            severity: record.severity,
            message: record.message,
            metadata: record.metadata,
        })
    }
}

impl LogEvent {
    /// Build a new event, drawing its id from `ids` and its timestamp from the clock
    pub fn new(
        source: SourceKind,
        message: impl Into<String>,
        severity: Severity,
        metadata: Option<Metadata>,
        ids: &dyn IdGenerator,
    ) -> Result<Self, EventError> {
        let message = message.into();
        if message.is_empty() {
            return Err(EventError::EmptyMessage);
        }

        let id = ids.generate()?;

        Ok(Self {
            id,
            timestamp: Utc::now(),
            source,
            severity,
            message,
            metadata,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Set a metadata value, creating the map on first write
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
    }

    /// Look up a single metadata value
    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    /// The whole metadata map, `None` until something has been written
    pub fn metadata_map(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Encode the event in its JSON interchange form
    pub fn to_json(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(EventError::Encode)
    }

    /// Decode an event previously produced by [`LogEvent::to_json`]
    pub fn from_json(data: &[u8]) -> Result<Self, EventError> {
        let record: EventRecord = serde_json::from_slice(data).map_err(EventError::Decode)?;
        Self::try_from(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IdGenerationError;
    use serde_json::json;

    struct FixedId;

    impl IdGenerator for FixedId {
        fn generate(&self) -> Result<String, IdGenerationError> {
            Ok("test-id".to_string())
        }
    }

    struct FailingId;

    impl IdGenerator for FailingId {
        fn generate(&self) -> Result<String, IdGenerationError> {
            Err(IdGenerationError("no entropy".to_string()))
        }
    }

    #[test]
    fn test_new_log_event() {
        let mut metadata = Metadata::new();
        metadata.insert("key".to_string(), json!("value"));

        let event = LogEvent::new(
            SourceKind::File,
            "Test message",
            Severity::Info,
            Some(metadata.clone()),
            &FixedId,
        )
        .unwrap();

        assert_eq!(event.id(), "test-id");
        assert_eq!(event.source(), SourceKind::File);
        assert_eq!(event.severity(), Severity::Info);
        assert_eq!(event.message(), "Test message");
        assert_eq!(event.metadata_map(), Some(&metadata));
        assert!((Utc::now() - event.timestamp()).num_seconds() < 1);
    }

    #[test]
    fn test_new_log_event_rejects_empty_message() {
        let err = LogEvent::new(SourceKind::Stdin, "", Severity::Info, None, &FixedId).unwrap_err();
        assert!(matches!(err, EventError::EmptyMessage));
    }

    #[test]
    fn test_new_log_event_propagates_id_failure() {
        let err =
            LogEvent::new(SourceKind::Stdin, "line", Severity::Info, None, &FailingId).unwrap_err();
        assert!(matches!(err, EventError::IdGeneration(_)));
    }

    #[test]
    fn test_add_metadata_initializes_lazily() {
        let mut event =
            LogEvent::new(SourceKind::Stdin, "nil metadata", Severity::Info, None, &FixedId)
                .unwrap();
        assert!(event.metadata_map().is_none());

        event.add_metadata("newKey", "newValue");
        assert_eq!(event.metadata("newKey"), Some(&json!("newValue")));
        assert_eq!(event.metadata_map().map(|m| m.len()), Some(1));

        event.add_metadata("newKey", 42);
        assert_eq!(event.metadata("newKey"), Some(&json!(42)));
        assert!(event.metadata("missing").is_none());
    }

    #[test]
    fn test_parse_severity() {
        assert_eq!(parse_severity("This is a DEBUG message"), Some(Severity::Debug));
        assert_eq!(parse_severity("INFO: Application started"), Some(Severity::Info));
        assert_eq!(parse_severity("WARNING: Low disk space"), Some(Severity::Warning));
        assert_eq!(parse_severity("Something went wrong ERROR"), Some(Severity::Error));
        assert_eq!(parse_severity("FATAL: System crash"), Some(Severity::Fatal));
        assert_eq!(parse_severity("DEBUG message with ERROR inside"), Some(Severity::Debug));
        assert_eq!(
            parse_severity("This is not an ERRORCODE but ERROR"),
            Some(Severity::Error)
        );
        assert_eq!(parse_severity("This is a regular message"), None);
        assert_eq!(parse_severity(""), None);
    }

    #[test]
    fn test_json_round_trip() {
        let mut event = LogEvent::new(
            SourceKind::UnixSocket,
            "Round trip test message",
            Severity::Debug,
            None,
            &FixedId,
        )
        .unwrap();
        event.add_metadata("number", 42.0);
        event.add_metadata("array", json!(["a", "b", "c"]));
        event.add_metadata("object", json!({ "nested": "value" }));

        let data = event.to_json().unwrap();
        let decoded = LogEvent::from_json(&data).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn test_json_shape() {
        let event =
            LogEvent::new(SourceKind::UnixSocket, "shape", Severity::Warning, None, &FixedId)
                .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["id"], "test-id");
        assert_eq!(value["source"], "unix-socket");
        assert_eq!(value["severity"], "WARNING");
        assert_eq!(value["message"], "shape");
        assert!(value.get("metadata").is_none());
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(LogEvent::from_json(br#"{"id": "123", "source":}"#).is_err());
        assert!(LogEvent::from_json(b"").is_err());
        assert!(LogEvent::from_json(br#"{"id": "test"}"#).is_err());
    }

    #[test]
    fn test_from_json_rejects_empty_message() {
        let data = br#"{
            "id": "test-id",
            "timestamp": "2024-01-01T00:00:00Z",
            "source": "stdin",
            "severity": "INFO",
            "message": ""
        }"#;

        let err = LogEvent::from_json(data).unwrap_err();
        assert!(matches!(err, EventError::EmptyMessage));
        assert!(serde_json::from_slice::<LogEvent>(data).is_err());

        let valid = String::from_utf8_lossy(data)
            .replace(r#""message": """#, r#""message": "ok""#);
        let event = LogEvent::from_json(valid.as_bytes()).unwrap();
        assert_eq!(event.message(), "ok");
        assert_eq!(event.id(), "test-id");
        assert!(event.metadata_map().is_none());
    }
}
