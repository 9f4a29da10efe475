use std::collections::VecDeque;

use chrono::{DateTime, Local, Utc};
use indexmap::IndexMap;

use crate::pipeline::types::Detection;

pub const HISTORY_CAPACITY: usize = 25;

/// Per-round tally of detections, keyed by class label in order of first occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub tally: IndexMap<String, usize>,
    pub total_count: usize,
}

impl HistoryEntry {
    pub fn from_detections(detections: &[Detection], timestamp: DateTime<Utc>) -> Self {
        let mut tally: IndexMap<String, usize> = IndexMap::new();
        for detection in detections {
            *tally.entry(detection.class_label.clone()).or_insert(0) += 1;
        }
        Self {
            timestamp,
            tally,
            total_count: detections.len(),
        }
    }

    /// `"person:2, car:1"`
    pub fn summary(&self) -> String {
        self.tally
            .iter()
            .map(|(label, count)| format!("{label}:{count}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn display_time(&self) -> String {
        self.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string()
    }
}

/// Bounded, most-recent-first log of round tallies.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
        }
    }

    /// Tallies `detections`, stamps the current time and prepends the entry,
    /// evicting the oldest one past capacity.
    pub fn record(&mut self, detections: &[Detection]) -> HistoryEntry {
        let entry = HistoryEntry::from_detections(detections, Utc::now());
        self.push(entry.clone());
        entry
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}
