// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// One task execution, timed relative to the recorder's origin.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub label: String,

    pub thread: String,

    pub start: Duration,

    pub end: Duration,
}

impl ExecutionRecord {
    pub fn overlaps(&self, other: &ExecutionRecord) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ExecutionLog {
    pub records: Vec<ExecutionRecord>,
}

/// Wraps task bodies to record when and where they ran.
#[derive(Debug)]
pub struct ExecutionRecorder {
    origin: Instant,
    records: Mutex<Vec<ExecutionRecord>>,
}

impl Default for ExecutionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionRecorder {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Runs `f` and records its start and end.
    pub fn record<F: FnOnce()>(&self, label: impl Into<String>, f: F) {
        let start = self.origin.elapsed();
        f();
        let end = self.origin.elapsed();
        self.records.lock().unwrap().push(ExecutionRecord {
            label: label.into(),
            thread: format!("{:?}", thread::current().id()),
            start,
            end,
        });
    }

    pub fn log(&self) -> ExecutionLog {
        let mut records = self.records.lock().unwrap().clone();
        records.sort_by_key(|r| r.start);
        ExecutionLog { records }
    }
}

impl ExecutionLog {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Labels ordered by start time.
    pub fn labels(&self) -> Vec<String> {
        self.records.iter().map(|r| r.label.clone()).collect()
    }

    pub fn with_prefix(&self, prefix: &str) -> ExecutionLog {
        ExecutionLog {
            records: self
                .records
                .iter()
                .filter(|r| r.label.starts_with(prefix))
                .cloned()
                .collect(),
        }
    }

    /// First pair of records whose intervals overlap.
    pub fn first_overlap(&self) -> Option<(&ExecutionRecord, &ExecutionRecord)> {
        self.records.iter().enumerate().find_map(|(i, a)| {
            self.records[i + 1..]
                .iter()
                .find(|b| a.overlaps(b))
                .map(|b| (a, b))
        })
    }

    /// True when some record of `self` overlaps some record of `other`.
    pub fn overlaps_with(&self, other: &ExecutionLog) -> bool {
        self.records
            .iter()
            .any(|a| other.records.iter().any(|b| a.overlaps(b)))
    }

    pub fn distinct_threads(&self) -> usize {
        let mut threads: Vec<&str> = self.records.iter().map(|r| r.thread.as_str()).collect();
        threads.sort_unstable();
        threads.dedup();
        threads.len()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(label: &str, start_ms: u64, end_ms: u64) -> ExecutionRecord {
        ExecutionRecord {
            label: label.to_string(),
            thread: "t".to_string(),
            start: Duration::from_millis(start_ms),
            end: Duration::from_millis(end_ms),
        }
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let log = ExecutionLog {
            records: vec![rec("a", 0, 10), rec("b", 10, 20), rec("c", 15, 30)],
        };
        let (a, b) = log.first_overlap().unwrap();
        assert_eq!((a.label.as_str(), b.label.as_str()), ("b", "c"));
        assert!(log.with_prefix("a").first_overlap().is_none());
    }

    #[test]
    fn log_survives_json() {
        let log = ExecutionLog {
            records: vec![rec("a", 1, 2)],
        };
        let back: ExecutionLog = serde_json::from_str(&log.to_json()).unwrap();
        assert_eq!(back.records, log.records);
    }
}
