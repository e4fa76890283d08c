use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

use crate::storage::truncate_reason;

const DEFAULT_CAPACITY: usize = 100;
const MAX_MESSAGE_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub credential_id: Option<String>,
    pub model: String,
    pub status: Option<u16>,
    pub message: String,
}

/// Bounded log of recent failed attempts, newest first.
pub struct ErrorLog {
    entries: Mutex<VecDeque<ErrorEntry>>,
    capacity: usize,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Mutex::new(VecDeque::with_capacity(capacity)), capacity: capacity.max(1) }
    }

    pub fn push(
        &self,
        credential_id: Option<&str>,
        model: &str,
        status: Option<u16>,
        message: &str,
    ) {
        let entry = ErrorEntry {
            timestamp: Utc::now(),
            credential_id: credential_id.map(str::to_string),
            model: model.to_string(),
            status,
            message: truncate_reason(message, MAX_MESSAGE_CHARS),
        };
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    pub fn recent(&self, limit: usize) -> Vec<ErrorEntry> {
        self.entries.lock().iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
