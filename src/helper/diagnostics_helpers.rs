use crate::models::DiagnosticEntry;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 200;

/// Bounded ring buffer of captured errors for the admin diagnostics view.
/// One process-wide instance is created at startup and shared via AppState;
/// when the buffer is full the oldest entry is dropped.
pub struct DiagnosticsLog {
    capacity: usize,
    entries: Mutex<VecDeque<DiagnosticEntry>>,
}

impl DiagnosticsLog {
    pub fn new(capacity: usize) -> Self {
        DiagnosticsLog {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<DiagnosticEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            log::error!("Diagnostics buffer mutex was poisoned; recovering.");
            poisoned.into_inner()
        })
    }

    pub fn capture(&self, source: &str, message: &str) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(DiagnosticEntry {
            at: Utc::now(),
            source: source.to_string(),
            message: message.to_string(),
        });
    }

    /// Newest first, ready for display.
    pub fn list(&self) -> Vec<DiagnosticEntry> {
        self.lock().iter().rev().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_list_clear_round_trip() {
        let diag = DiagnosticsLog::new(10);
        diag.capture("feed", "events fetch failed");
        diag.capture("ingest", "create failed");

        let listed = diag.list();
        assert_eq!(listed.len(), 2);
        // Newest first.
        assert_eq!(listed[0].source, "ingest");
        assert_eq!(listed[1].message, "events fetch failed");

        diag.clear();
        assert!(diag.is_empty());
    }

    #[test]
    fn capacity_is_a_hard_bound() {
        let diag = DiagnosticsLog::new(3);
        for i in 0..10 {
            diag.capture("loop", &format!("entry {}", i));
        }
        let listed = diag.list();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].message, "entry 9");
        assert_eq!(listed[2].message, "entry 7");
    }
}
