use serde::Serialize;
use tracing::{info, warn};

use loupe_store::settings::ServerSettings;
use loupe_store::Store;

use crate::error::RetentionError;

const SIZE_PHASE_ITERATION_CAP: u32 = 5000;

#[derive(Debug, Default, Serialize)]
pub struct RetentionReport {
    pub sessions_deleted_age: u32,
    pub sessions_deleted_count: u32,
    pub sessions_deleted_size: u32,
    pub orphans_removed: u64,
    pub pinned_protected: bool,
    pub warnings: Vec<String>,
    pub compacted: bool,
}

pub struct RetentionEngine {
    store: Store,
}

impl RetentionEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Whether a scheduled pass is due: either the interval has elapsed
    /// since `last_cleanup_at`, or cleanup has never run (spec.md §4.4 —
    /// "may also run on process start").
    pub fn due(&self, settings: &ServerSettings, now_ms: i64) -> bool {
        match settings.last_cleanup_at {
            None => true,
            Some(last) => now_ms - last >= settings.cleanup_interval_minutes * 60_000,
        }
    }

    /// Runs one full retention pass (spec.md §4.4): age, count, size,
    /// orphan sweep, in that order. Pins are inviolable; a phase that can't
    /// make progress because only pinned sessions remain stops and reports
    /// `pinned_protected`.
    pub fn run_pass(&self, now_ms: i64) -> Result<RetentionReport, RetentionError> {
        let settings = self.store.settings().get()?;
        let sessions = self.store.sessions();
        let mut report = RetentionReport::default();

        // Phase 1: age.
        let cutoff = now_ms - settings.retention_days * 86_400_000;
        loop {
            match sessions.oldest_unpinned_before(cutoff)? {
                Some(row) => {
                    sessions.delete(&row.id)?;
                    report.sessions_deleted_age += 1;
                }
                None => break,
            }
        }

        // Phase 2: count.
        while sessions.count_all()? > settings.max_sessions {
            match sessions.oldest_unpinned()? {
                Some(row) => {
                    sessions.delete(&row.id)?;
                    report.sessions_deleted_count += 1;
                }
                None => {
                    report.pinned_protected = true;
                    report.warnings.push(
                        "only pinned sessions remain; max_sessions still exceeded".to_string(),
                    );
                    break;
                }
            }
        }

        // Phase 3: size.
        let mut size_iterations = 0u32;
        let max_bytes = settings.max_db_mb * 1024 * 1024;
        while self.db_size_bytes() > max_bytes && size_iterations < SIZE_PHASE_ITERATION_CAP {
            match sessions.oldest_unpinned()? {
                Some(row) => {
                    sessions.delete(&row.id)?;
                    report.sessions_deleted_size += 1;
                    size_iterations += 1;
                }
                None => {
                    report.pinned_protected = true;
                    report
                        .warnings
                        .push("only pinned sessions remain; max_db_mb still exceeded".to_string());
                    break;
                }
            }
        }
        if size_iterations >= SIZE_PHASE_ITERATION_CAP {
            report
                .warnings
                .push(format!("size phase hit its {SIZE_PHASE_ITERATION_CAP}-iteration safety cap"));
        }
        if report.sessions_deleted_size > 0 {
            self.compact()?;
            report.compacted = true;
        }

        // Phase 4: orphan sweep.
        report.orphans_removed = self.store.snapshots().sweep_orphans()?;

        self.store.settings().record_cleanup_run(now_ms)?;
        info!(?report, "retention pass complete");
        Ok(report)
    }

    fn db_size_bytes(&self) -> i64 {
        std::fs::metadata(self.store.db().path())
            .map(|m| m.len() as i64)
            .unwrap_or(0)
    }

    fn compact(&self) -> Result<(), RetentionError> {
        self.store
            .db()
            .with_conn(|conn| conn.execute_batch("VACUUM;").map_err(Into::into))?;
        Ok(())
    }
}
