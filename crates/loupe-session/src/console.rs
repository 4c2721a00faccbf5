use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default and hard-max ring sizing (spec.md §5 "Back-pressure").
pub const DEFAULT_CAPACITY: usize = 1500;
pub const MAX_ARGS_PER_ENTRY: usize = 25;
pub const MAX_MESSAGE_CHARS: usize = 2000;

pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const MAX_QUERY_LIMIT: usize = 500;

/// A single console or runtime-error entry mirrored into the live ring as
/// `event` frames arrive (spec.md §4.5). `is_runtime_error` distinguishes
/// `error`-kind events from plain `console` ones for the
/// `excludeRuntimeErrors` query filter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LiveConsoleEntry {
    pub timestamp: i64,
    pub level: String,
    pub message: String,
    pub args: Vec<serde_json::Value>,
    pub tab_id: Option<i64>,
    pub origin: Option<String>,
    pub is_runtime_error: bool,
}

#[derive(Default)]
pub struct LiveConsoleFilter {
    pub tab_id: Option<i64>,
    pub origin: Option<String>,
    pub levels: Option<Vec<String>>,
    pub contains: Option<String>,
    pub since_ts: Option<i64>,
    pub exclude_runtime_errors: bool,
    pub limit: Option<usize>,
}

/// Bounded per-session ring of recent console/runtime-error entries
/// (spec.md §3 `LiveConsoleBuffer`, §5 back-pressure rule): oldest entry is
/// evicted on overflow and `dropped` counts every eviction.
pub struct LiveConsoleBuffer {
    entries: VecDeque<LiveConsoleEntry>,
    capacity: usize,
    dropped: u64,
}

impl LiveConsoleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity.min(4096)), capacity, dropped: 0 }
    }

    pub fn push(&mut self, mut entry: LiveConsoleEntry) {
        if entry.message.chars().count() > MAX_MESSAGE_CHARS {
            entry.message = entry.message.chars().take(MAX_MESSAGE_CHARS).collect();
        }
        if entry.args.len() > MAX_ARGS_PER_ENTRY {
            entry.args.truncate(MAX_ARGS_PER_ENTRY);
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(entry);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies a filter, newest-first, clamping `limit` into
    /// `[1, MAX_QUERY_LIMIT]` with `DEFAULT_QUERY_LIMIT` when unset
    /// (spec.md §4.6).
    pub fn query(&self, filter: &LiveConsoleFilter) -> Vec<LiveConsoleEntry> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT);

        self.entries
            .iter()
            .rev()
            .filter(|e| filter.tab_id.map_or(true, |t| e.tab_id == Some(t)))
            .filter(|e| filter.origin.as_deref().map_or(true, |o| e.origin.as_deref() == Some(o)))
            .filter(|e| {
                filter
                    .levels
                    .as_ref()
                    .map_or(true, |levels| levels.iter().any(|l| l == &e.level))
            })
            .filter(|e| {
                filter
                    .contains
                    .as_deref()
                    .map_or(true, |needle| e.message.contains(needle))
            })
            .filter(|e| filter.since_ts.map_or(true, |ts| e.timestamp >= ts))
            .filter(|e| !(filter.exclude_runtime_errors && e.is_runtime_error))
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for LiveConsoleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
