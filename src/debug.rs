use parking_lot::Mutex;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::RayError;

/// One surface event of a flagged ray.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub start: Vec<f64>,
    pub end: Vec<f64>,
    pub direction: Vec<f64>,
    pub color: [f64; 3],
    pub level: usize,
    pub hit_object: String,
    pub distance: f64,
}

/// Collects per-bounce records for flagged rays across all workers.
/// One sink per render run; disabled sinks cost a single branch.
pub struct DebugSink {
    enabled: bool,
    records: Mutex<Vec<TraceRecord>>,
}

impl DebugSink {
    pub fn new(enabled: bool) -> DebugSink {
        DebugSink {
            enabled,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, record: TraceRecord) {
        if !self.enabled {
            return;
        }
        self.records.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dumps all collected records as a JSON array.
    pub fn save(&self, path: &Path) -> Result<(), RayError> {
        let records = self.records.lock();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &*records)?;
        Ok(())
    }
}

/// Flags sample 0 of every 100th coordinate on each axis.
pub fn should_flag(index: &[usize], sample: usize) -> bool {
    sample == 0 && index.iter().all(|&c| c % 100 == 1)
}
