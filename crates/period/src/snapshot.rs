// Snapshot Generator
//
// Converts the live presence captured at a class boundary into one history
// batch and one report file. Rows always follow roster order.

use chrono::NaiveDateTime;
use rollcall_core::Roster;
use rollcall_history::{
    AttendanceRow, AttendanceStatus, HistoryRecord, Ledger, LedgerError, ReportError,
    ReportWriter, NOT_FOUND,
};
use rollcall_presence::PresenceSnapshot;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("history write failed: {0}")]
    History(#[from] LedgerError),
    #[error("report write failed: {0}")]
    Report(#[from] ReportError),
}

/// Result of one snapshot run
#[derive(Debug)]
pub struct SnapshotOutcome {
    pub label: String,
    pub generated_at: NaiveDateTime,
    pub rows: Vec<AttendanceRow>,
    pub report_path: Option<PathBuf>,
    pub errors: Vec<SnapshotError>,
}

impl SnapshotOutcome {
    /// Both the history batch and the report were written.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn count(&self, status: AttendanceStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }
}

/// Classify every roster entity against the captured presence.
pub fn reconcile(
    roster: &Roster,
    safe_zones: &HashSet<String>,
    label: &str,
    presence: &PresenceSnapshot,
) -> Vec<AttendanceRow> {
    roster
        .entries()
        .iter()
        .map(|entry| {
            let (status, location) = match presence.get(entry.id) {
                None => (AttendanceStatus::Absent, NOT_FOUND.to_string()),
                Some(record) if safe_zones.contains(&record.observed_label) => {
                    (AttendanceStatus::Present, record.observed_label.clone())
                }
                Some(record) => (AttendanceStatus::AbsentAnomaly, record.observed_label.clone()),
            };
            AttendanceRow {
                entity_id: entry.id,
                name: entry.name.clone(),
                label: label.to_string(),
                status,
                location,
            }
        })
        .collect()
}

pub struct SnapshotGenerator {
    roster: Arc<Roster>,
    safe_zones: HashSet<String>,
    ledger: Ledger,
    reports: ReportWriter,
}

impl SnapshotGenerator {
    pub fn new(
        roster: Arc<Roster>,
        safe_zones: impl IntoIterator<Item = String>,
        ledger: Ledger,
        reports: ReportWriter,
    ) -> Self {
        Self {
            roster,
            safe_zones: safe_zones.into_iter().collect(),
            ledger,
            reports,
        }
    }

    pub fn safe_zones(&self) -> &HashSet<String> {
        &self.safe_zones
    }

    /// Reconcile, then write history and the report independently. Failures
    /// are logged and returned in the outcome; they never panic or retry.
    pub fn generate(
        &self,
        label: &str,
        presence: &PresenceSnapshot,
        generated_at: NaiveDateTime,
    ) -> SnapshotOutcome {
        let rows = reconcile(&self.roster, &self.safe_zones, label, presence);
        let mut errors = Vec::new();

        let history: Vec<HistoryRecord> = rows
            .iter()
            .map(|row| HistoryRecord::from_row(row, generated_at))
            .collect();
        if let Err(e) = self.ledger.append_history(&history) {
            tracing::error!("Snapshot '{}': history write failed: {}", label, e);
            errors.push(SnapshotError::from(e));
        }

        let report_path = match self.reports.write(label, generated_at, &rows) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!("Snapshot '{}': report write failed: {}", label, e);
                errors.push(SnapshotError::from(e));
                None
            }
        };

        let outcome = SnapshotOutcome {
            label: label.to_string(),
            generated_at,
            rows,
            report_path,
            errors,
        };
        tracing::info!(
            "Snapshot '{}': {} present, {} absent, {} anomalies",
            label,
            outcome.count(AttendanceStatus::Present),
            outcome.count(AttendanceStatus::Absent),
            outcome.count(AttendanceStatus::AbsentAnomaly)
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rollcall_core::RosterEntry;
    use rollcall_presence::{Observation, PresenceStore};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn roster() -> Arc<Roster> {
        Arc::new(
            Roster::new(vec![
                RosterEntry::new(3, "C"),
                RosterEntry::new(1, "A"),
                RosterEntry::new(2, "B"),
            ])
            .unwrap(),
        )
    }

    fn zones() -> HashSet<String> {
        ["Room1".to_string()].into_iter().collect()
    }

    #[tokio::test]
    async fn test_reconcile_statuses_in_roster_order() {
        let store = PresenceStore::new(roster());
        store.upsert(Observation::new(1, "Room1", at(9, 20))).await;
        store.upsert(Observation::new(3, "Canteen", at(9, 25))).await;

        let rows = reconcile(&roster(), &zones(), "Math", &store.snapshot().await);
        let summary: Vec<_> = rows
            .iter()
            .map(|r| (r.entity_id, r.status, r.location.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (3, AttendanceStatus::AbsentAnomaly, "Canteen"),
                (1, AttendanceStatus::Present, "Room1"),
                (2, AttendanceStatus::Absent, NOT_FOUND),
            ]
        );
        assert!(rows.iter().all(|r| r.label == "Math"));
    }

    #[test]
    fn test_reconcile_empty_presence_all_absent() {
        let rows = reconcile(&roster(), &zones(), "Math", &PresenceSnapshot::default());
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.status == AttendanceStatus::Absent));
    }

    #[tokio::test]
    async fn test_generate_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open_in_memory().unwrap();
        let generator = SnapshotGenerator::new(
            roster(),
            vec!["Room1".to_string()],
            ledger.clone(),
            ReportWriter::new(dir.path()),
        );
        let store = PresenceStore::new(roster());
        store.upsert(Observation::new(2, "Room1", at(9, 30))).await;
        let presence = store.snapshot().await;

        let first = generator.generate("Math", &presence, at(10, 0));
        let second = generator.generate("Math", &presence, at(10, 1));

        assert!(first.is_complete() && second.is_complete());
        assert_eq!(first.rows, second.rows);
        assert_ne!(first.report_path, second.report_path);
        assert_eq!(
            ledger
                .query_history(&rollcall_history::HistoryFilter::default())
                .unwrap()
                .len(),
            6
        );
    }

    #[test]
    fn test_report_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the report directory should be.
        let blocked = dir.path().join("reports");
        std::fs::write(&blocked, "not a directory").unwrap();

        let ledger = Ledger::open_in_memory().unwrap();
        let generator = SnapshotGenerator::new(
            roster(),
            vec!["Room1".to_string()],
            ledger.clone(),
            ReportWriter::new(&blocked),
        );

        let outcome = generator.generate("Math", &PresenceSnapshot::default(), at(10, 0));
        assert!(!outcome.is_complete());
        assert!(matches!(outcome.errors[0], SnapshotError::Report(_)));
        assert!(outcome.report_path.is_none());
        // History still landed.
        assert_eq!(
            ledger
                .query_history(&rollcall_history::HistoryFilter::default())
                .unwrap()
                .len(),
            3
        );
    }
}
