/// Observation records: one structured description per inbound request,
/// handed to a sink before the request is answered.
use crate::config::RuntimeOptions;
use crate::request::InboundRequest;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Protocol tag attached to every emitted record.
const SERVER_TAG: &str = "http";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservationRecord {
    pub action: String,
    pub path: String,
    pub args: BTreeMap<String, Vec<String>>,
    pub src_ip: String,
    pub src_port: u16,
    /// Present only with header capture enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl ObservationRecord {
    pub fn from_request(request: &InboundRequest, options: RuntimeOptions) -> Self {
        Self {
            action: request.method.clone(),
            path: request.path.clone(),
            args: request.args.clone(),
            src_ip: request.client_ip(options.forwarded_client_ip),
            src_port: request.peer.port(),
            headers: options.capture_headers.then(|| request.header_map()),
        }
    }
}

/// Record as written out: timestamped and tagged.
#[derive(Serialize)]
struct Envelope<'a> {
    timestamp: String,
    server: &'static str,
    #[serde(flatten)]
    record: &'a ObservationRecord,
}

impl<'a> Envelope<'a> {
    fn now(record: &'a ObservationRecord) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            server: SERVER_TAG,
            record,
        }
    }
}

/// Destination for observation records. Delivery is fire-and-forget: sinks
/// report their own failures and never fail the request.
pub trait ObservationSink: Send + Sync {
    fn record(&self, record: &ObservationRecord);
}

impl<T: ObservationSink + ?Sized> ObservationSink for Arc<T> {
    fn record(&self, record: &ObservationRecord) {
        (**self).record(record)
    }
}

impl<T: ObservationSink + ?Sized> ObservationSink for Box<T> {
    fn record(&self, record: &ObservationRecord) {
        (**self).record(record)
    }
}

/// Emits each record as an `info` event on target `decoy::observation`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ObservationSink for TracingSink {
    fn record(&self, record: &ObservationRecord) {
        match serde_json::to_string(&Envelope::now(record)) {
            Ok(json) => tracing::info!(
                target: "decoy::observation",
                src_ip = %record.src_ip,
                src_port = record.src_port,
                action = %record.action,
                path = %record.path,
                "{}",
                json
            ),
            Err(e) => tracing::warn!("Failed to encode observation: {}", e),
        }
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn write_line(&self, record: &ObservationRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(&Envelope::now(record))?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line)
    }
}

impl ObservationSink for JsonLinesSink {
    fn record(&self, record: &ObservationRecord) {
        if let Err(e) = self.write_line(record) {
            tracing::warn!("Failed to write observation: {}", e);
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ObservationRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ObservationRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ObservationSink for MemorySink {
    fn record(&self, record: &ObservationRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

/// Sends every record to both sinks.
#[derive(Debug)]
pub struct Tee<A, B>(pub A, pub B);

impl<A: ObservationSink, B: ObservationSink> ObservationSink for Tee<A, B> {
    fn record(&self, record: &ObservationRecord) {
        self.0.record(record);
        self.1.record(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn request() -> InboundRequest {
        InboundRequest::new("POST", "/wp-login.php?log=admin", "198.51.100.20:40000".parse().unwrap())
            .with_header("User-Agent", "curl/8.0")
            .with_header("X-Forwarded-For", "192.0.2.1")
    }

    #[test]
    fn test_record_without_headers() {
        let record = ObservationRecord::from_request(&request(), RuntimeOptions::default());
        assert_eq!(record.action, "POST");
        assert_eq!(record.path, "/wp-login.php");
        assert_eq!(record.args["log"], vec!["admin"]);
        assert_eq!(record.src_ip, "198.51.100.20");
        assert_eq!(record.src_port, 40000);
        assert!(record.headers.is_none());

        let json: Value = serde_json::to_value(&record).unwrap();
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn test_record_with_headers_and_forwarded_ip() {
        let options = RuntimeOptions {
            capture_headers: true,
            forwarded_client_ip: true,
        };
        let record = ObservationRecord::from_request(&request(), options);
        assert_eq!(record.src_ip, "192.0.2.1");

        let headers = record.headers.as_ref().unwrap();
        assert_eq!(headers["user-agent"], "curl/8.0");
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_envelope_shape() {
        let record = ObservationRecord::from_request(&request(), RuntimeOptions::default());
        let json: Value = serde_json::to_value(Envelope::now(&record)).unwrap();
        assert_eq!(json["server"], "http");
        assert_eq!(json["action"], "POST");
        assert_eq!(json["src_port"], 40000);
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("http.jsonl");
        let sink = JsonLinesSink::open(&path).unwrap();
        let record = ObservationRecord::from_request(&request(), RuntimeOptions::default());
        sink.record(&record);
        sink.record(&record);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["path"], "/wp-login.php");
    }

    #[test]
    fn test_tee_and_memory_sink() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let tee = Tee(a.clone(), b.clone());
        let record = ObservationRecord::from_request(&request(), RuntimeOptions::default());
        tee.record(&record);

        assert_eq!(a.records(), vec![record.clone()]);
        assert_eq!(b.records(), vec![record]);
    }
}
