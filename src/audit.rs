//! Audit trail of readings and commands.

use crate::command::ControlCommand;
use crate::units::NormalizedReading;
use heapless::Deque;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::error;

pub const AUDIT_HISTORY_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    SensorReading(NormalizedReading),
    ActuatorCommand(ControlCommand),
}

/// Fire-and-forget sink; implementations report their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Keeps the most recent records in memory, evicting the oldest when full.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    history: Mutex<Deque<AuditRecord, AUDIT_HISTORY_SIZE>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn readings(&self) -> Vec<NormalizedReading> {
        lock(&self.history)
            .iter()
            .filter_map(|record| match record {
                AuditRecord::SensorReading(reading) => Some(reading.clone()),
                AuditRecord::ActuatorCommand(_) => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<ControlCommand> {
        lock(&self.history)
            .iter()
            .filter_map(|record| match record {
                AuditRecord::ActuatorCommand(command) => Some(command.clone()),
                AuditRecord::SensorReading(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.history).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.history).is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        let mut history = lock(&self.history);
        if history.is_full() {
            history.pop_front();
        }
        if let Err(record) = history.push_back(record) {
            error!(?record, "Audit history full, record dropped");
        }
    }
}

/// Appends one JSON document per record to a writer.
#[derive(Debug)]
pub struct JsonLinesAuditSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl JsonLinesAuditSink<BufWriter<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonLinesAuditSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = lock(&self.writer);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<W: Write + Send> AuditSink for JsonLinesAuditSink<W> {
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.append(&record) {
            error!(error = %e, "Failed to append audit record");
        }
    }
}
