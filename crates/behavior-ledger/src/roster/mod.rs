//! Fixed-header CSV roster import (`Student Number,Full Name,Grade,Class`).

mod parser;

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::ledger::{
    AuditSink, EventStore, LedgerService, LedgerServiceError, StudentId, StudentNumber,
    StudentStore,
};

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Ledger(LedgerServiceError),
}

impl std::fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read roster file: {}", err),
            RosterImportError::Csv(err) => write!(f, "invalid roster CSV data: {}", err),
            RosterImportError::Ledger(err) => {
                write!(f, "could not register roster students: {}", err)
            }
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
            RosterImportError::Ledger(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<LedgerServiceError> for RosterImportError {
    fn from(err: LedgerServiceError) -> Self {
        Self::Ledger(err)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterImportSummary {
    pub registered: Vec<StudentId>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub line: usize,
    pub student_number: StudentNumber,
    pub reason: String,
}

pub struct RosterImporter;

impl RosterImporter {
    pub fn from_path<P, R, A>(
        path: P,
        service: &LedgerService<R, A>,
    ) -> Result<RosterImportSummary, RosterImportError>
    where
        P: AsRef<Path>,
        R: StudentStore + EventStore + 'static,
        A: AuditSink + 'static,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, service)
    }

    /// Register every new student number. Existing numbers keep their aggregates.
    pub fn from_reader<Rd, R, A>(
        reader: Rd,
        service: &LedgerService<R, A>,
    ) -> Result<RosterImportSummary, RosterImportError>
    where
        Rd: Read,
        R: StudentStore + EventStore + 'static,
        A: AuditSink + 'static,
    {
        let mut summary = RosterImportSummary::default();
        let mut seen: HashSet<String> = HashSet::new();

        for record in parser::parse_records(reader)? {
            let number = record.student.student_number.clone();
            let skip = |reason: &str| SkippedRow {
                line: record.line,
                student_number: number.clone(),
                reason: reason.to_string(),
            };

            if !seen.insert(number.0.trim().to_string()) {
                summary.skipped.push(skip("duplicate row in file"));
                continue;
            }

            match service.register_student(record.student) {
                Ok(student) => summary.registered.push(student.id),
                Err(LedgerServiceError::DuplicateStudent(_)) => {
                    summary.skipped.push(skip("already registered"));
                }
                Err(LedgerServiceError::Validation(error)) => {
                    warn!(line = record.line, error = %error, "roster row rejected");
                    summary.skipped.push(skip(&error.to_string()));
                }
                Err(other) => return Err(other.into()),
            }
        }

        info!(
            registered = summary.registered.len(),
            skipped = summary.skipped.len(),
            "roster import finished"
        );
        Ok(summary)
    }
}
