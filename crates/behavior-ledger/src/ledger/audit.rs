use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EventId, ScoreField, StudentId};
use super::policy::ClampedWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOperation {
    Apply,
    Replace,
    Reverse,
    Repair,
}

impl LedgerOperation {
    pub const fn label(self) -> &'static str {
        match self {
            LedgerOperation::Apply => "apply",
            LedgerOperation::Replace => "replace",
            LedgerOperation::Reverse => "reverse",
            LedgerOperation::Repair => "repair",
        }
    }
}

/// One committed aggregate change, emitted after both writes landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub operation: LedgerOperation,
    pub student_id: StudentId,
    pub event_id: Option<EventId>,
    pub field: ScoreField,
    pub before: i32,
    pub after: i32,
    pub attempts: u32,
    pub warning: Option<ClampedWarning>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn summary(&self) -> String {
        let subject = match &self.event_id {
            Some(event_id) => format!("event {}", event_id.0),
            None => "aggregates".to_string(),
        };
        format!(
            "{} {} for {}: {} {} -> {}",
            self.operation.label(),
            subject,
            self.student_id.0,
            self.field.label(),
            self.before,
            self.after
        )
    }
}

/// Outbound hook for committed ledger changes (audit trail, notifications).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit transport unavailable: {0}")]
    Transport(String),
}
