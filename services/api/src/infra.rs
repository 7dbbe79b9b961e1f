use behavior_ledger::ledger::{AuditEntry, AuditError, AuditSink};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Audit trail kept in process memory and mirrored to the log.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        info!(
            operation = entry.operation.label(),
            student_id = %entry.student_id,
            attempts = entry.attempts,
            "{}",
            entry.summary()
        );
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| AuditError::Transport("audit log mutex poisoned".to_string()))?;
        guard.push(entry);
        Ok(())
    }
}

impl InMemoryAuditLog {
    pub(crate) fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use behavior_ledger::ledger::{LedgerOperation, ScoreField, StudentId};
    use chrono::Utc;

    #[test]
    fn audit_log_keeps_entries_in_order() {
        let log = InMemoryAuditLog::default();
        for (before, after) in [(80, 75), (75, 70)] {
            log.record(AuditEntry {
                operation: LedgerOperation::Apply,
                student_id: StudentId("stu-000001".to_string()),
                event_id: None,
                field: ScoreField::Behavior,
                before,
                after,
                attempts: 1,
                warning: None,
                recorded_at: Utc::now(),
            })
            .expect("recorded");
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].after, 70);
    }

    #[test]
    fn parse_date_reports_the_raw_value() {
        assert_eq!(
            parse_date(" 2025-09-08 "),
            Ok(NaiveDate::from_ymd_opt(2025, 9, 8).expect("valid date"))
        );
        let error = parse_date("08/09/2025").expect_err("wrong format");
        assert!(error.contains("08/09/2025"));
    }
}
