use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::audit::AuditEvent;
use crate::domain::ports::AuditSink;

/// Bounded in-memory ring buffer, used in tests and as a scratch sink before
/// a durable backend is wired up (spec §4.10).
pub struct InMemoryAuditSink {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, event: AuditEvent) -> anyhow::Result<()> {
        let mut events = self.events.lock().unwrap();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

/// Append-only JSON-lines file sink for production use (spec §4.10), grounded
/// in `original_source/packages/order_submission/__init__.py`'s `_emit_event`,
/// which appends one JSON object per line rather than writing SQL rows. Each
/// `append` call opens the file in append mode, writes one line, and flushes,
/// so a crash mid-write loses at most the in-flight event.
pub struct JsonLinesAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesAuditSink {
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Reads back every event recorded so far, in append order. Used by
    /// operational tooling and tests; not on the hot write path.
    pub fn read_all(&self) -> anyhow::Result<Vec<AuditEvent>> {
        let _guard = self.lock.lock().unwrap();
        let contents = std::fs::read_to_string(&self.path)?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
            .collect()
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    async fn append(&self, event: AuditEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(&event)?;
        let _guard = self.lock.lock().unwrap();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditEventType;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_past_capacity() {
        let sink = InMemoryAuditSink::new(2);
        for i in 0..3 {
            sink.append(AuditEvent::new(
                AuditEventType::OrderSubmitted,
                format!("corr-{i}"),
                json!({"i": i}),
                Utc::now(),
            ))
            .await
            .unwrap();
        }
        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].correlation_id, "corr-1");
        assert_eq!(events[1].correlation_id, "corr-2");
    }

    #[tokio::test]
    async fn json_lines_sink_appends_and_reads_back_in_order() {
        let path = std::env::temp_dir().join(format!("audit-{}.jsonl", uuid::Uuid::new_v4()));
        let sink = JsonLinesAuditSink::new(path.clone()).unwrap();

        sink.append(AuditEvent::new(
            AuditEventType::KillSwitchActivated,
            "corr-x",
            json!({"reason": "test"}),
            Utc::now(),
        ))
        .await
        .unwrap();
        sink.append(AuditEvent::new(
            AuditEventType::KillSwitchDeactivated,
            "corr-y",
            json!({}),
            Utc::now(),
        ))
        .await
        .unwrap();

        let events = sink.read_all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].correlation_id, "corr-x");
        assert_eq!(events[1].correlation_id, "corr-y");

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn json_lines_sink_creates_parent_directories() {
        let dir = std::env::temp_dir().join(format!("audit-dir-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("audit.jsonl");
        let sink = JsonLinesAuditSink::new(path.clone()).unwrap();
        sink.append(AuditEvent::new(
            AuditEventType::ErrorOccurred,
            "corr-z",
            json!({}),
            Utc::now(),
        ))
        .await
        .unwrap();
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
