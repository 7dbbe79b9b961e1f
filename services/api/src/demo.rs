use crate::infra::InMemoryAuditLog;
use behavior_ledger::config::LedgerConfig;
use behavior_ledger::error::AppError;
use behavior_ledger::ledger::{
    DraftKind, EventDraft, EventId, EventRevision, InMemoryLedgerStore, LedgerReceipt,
    LedgerService, NewStudent, Student, StudentNumber, StudentRef,
};
use behavior_ledger::roster::{RosterImportSummary, RosterImporter};
use chrono::{Local, NaiveDate};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

type DemoService = LedgerService<InMemoryLedgerStore, InMemoryAuditLog>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date stamped on every demo event (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Print the audit trail collected during the demo.
    #[arg(long)]
    pub(crate) show_audit: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RosterImportArgs {
    /// Roster CSV with the `Student Number,Full Name,Grade,Class` header
    pub(crate) csv: PathBuf,
    /// List every skipped row with its reason
    #[arg(long)]
    pub(crate) list_skipped: bool,
}

fn demo_service() -> (DemoService, InMemoryAuditLog) {
    let audit = InMemoryAuditLog::default();
    let service = LedgerService::new(
        Arc::new(InMemoryLedgerStore::default()),
        Arc::new(audit.clone()),
        LedgerConfig::default(),
    );
    (service, audit)
}

/// Validate a roster file by importing it into an empty in-memory ledger.
pub(crate) fn run_roster_import(args: RosterImportArgs) -> Result<(), AppError> {
    let RosterImportArgs { csv, list_skipped } = args;
    let (service, _) = demo_service();

    let summary = RosterImporter::from_path(&csv, &service)?;
    render_roster_summary(&summary, list_skipped);
    Ok(())
}

fn render_roster_summary(summary: &RosterImportSummary, list_skipped: bool) {
    println!("Roster import");
    println!(
        "- {} students registered | {} rows skipped",
        summary.registered.len(),
        summary.skipped.len()
    );
    if list_skipped {
        for row in &summary.skipped {
            println!(
                "  - line {} ({}): {}",
                row.line, row.student_number, row.reason
            );
        }
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { date, show_audit } = args;
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let (service, audit) = demo_service();

    println!("Behavior score ledger demo");

    println!("\nIncident lifecycle");
    let ada = service.register_student(new_student("1001", "Ada Park"))?;
    render_student("registered", &ada);
    let first = service.record_event(incident(&ada, date, 10))?;
    render_receipt("incident -10", &first);
    let second = service.record_event(incident(&ada, date, 15))?;
    render_receipt("incident -15", &second);
    let revised = service.revise_event(
        &second.event.id,
        EventRevision {
            date,
            kind: DraftKind::Incident {
                misconduct_code: "DISRUPTION".to_string(),
                degree: Some(2),
                points: Some(5),
            },
            rationale: "downgraded after review".to_string(),
            evidence: None,
        },
    )?;
    render_receipt("revised to -5", &revised);
    let removed = service.remove_event(&first.event.id)?;
    render_receipt("removed first incident", &removed);

    println!("\nDistinguished cap");
    let ben = service.register_student(new_student("1002", "Ben Okafor"))?;
    render_student("registered", &ben);
    let first_award = service.record_event(award(&ben, date, 15))?;
    render_receipt("award +15", &first_award);
    let capped = service.record_event(award(&ben, date, 10))?;
    render_receipt("award +10", &capped);
    let reversed = service.remove_event(&capped.event.id)?;
    render_receipt("removed capped award", &reversed);

    println!("\nAbsence excusal");
    let chen = service.register_student(new_student("1003", "Chen Liu"))?;
    let missed = service.record_event(absence(&chen, date, 4))?;
    render_receipt("absence -4", &missed);
    let excused = service.excuse_absence(&missed.event.id)?;
    render_receipt("excused", &excused);

    println!("\nBatch reversal");
    let batch_ids = [&ada, &ben, &chen]
        .into_iter()
        .map(|student| {
            service
                .record_event(incident(student, date, 4))
                .map(|receipt| receipt.event.id)
        })
        .collect::<Result<Vec<EventId>, _>>()?;
    let service = Arc::new(service);
    let report = Arc::clone(&service).reverse_many(batch_ids).await;
    println!(
        "- {} events reversed | {} failures",
        report.reversed.len(),
        report.failures.len()
    );
    for failure in &report.failures {
        println!("  - {}: {}", failure.event_id, failure.error);
    }

    println!("\nReconciliation");
    for student in [&ada, &ben, &chen] {
        let drift = service.reconcile(&student.id)?;
        println!(
            "- {} ({}): {} active events | {}",
            student.full_name,
            student.student_number,
            drift.active_events,
            if drift.is_consistent() {
                "consistent".to_string()
            } else {
                format!("{} drifted fields", drift.drifts.len())
            }
        );
    }

    println!("\nStandings");
    for entry in service.standings()? {
        println!(
            "  {}. {} | behavior {} | distinguished {} | combined {}",
            entry.rank,
            entry.student.full_name,
            entry.student.behavior_score,
            entry.student.distinguished_score,
            entry.student.combined_total
        );
    }

    if show_audit {
        println!("\nAudit trail");
        for entry in audit.entries() {
            println!("  - {}", entry.summary());
        }
    }

    Ok(())
}

fn new_student(number: &str, name: &str) -> NewStudent {
    NewStudent {
        student_number: StudentNumber(number.to_string()),
        full_name: name.to_string(),
        grade: Some("7".to_string()),
        class_name: Some("7B".to_string()),
    }
}

fn incident(student: &Student, date: NaiveDate, points: u32) -> EventDraft {
    EventDraft {
        student: StudentRef::Id(student.id.clone()),
        date,
        kind: DraftKind::Incident {
            misconduct_code: "DISRUPTION".to_string(),
            degree: Some(2),
            points: Some(points),
        },
        rationale: "talking during the lesson".to_string(),
        evidence: None,
    }
}

fn award(student: &Student, date: NaiveDate, points: u32) -> EventDraft {
    EventDraft {
        student: StudentRef::Number(student.student_number.clone()),
        date,
        kind: DraftKind::PositiveAction {
            action_code: "COMPETITION_AWARD".to_string(),
            points: Some(points),
        },
        rationale: "regional science fair".to_string(),
        evidence: None,
    }
}

fn absence(student: &Student, date: NaiveDate, points: u32) -> EventDraft {
    EventDraft {
        student: StudentRef::Id(student.id.clone()),
        date,
        kind: DraftKind::Absence {
            points,
            has_excuse: false,
        },
        rationale: "absent without note".to_string(),
        evidence: None,
    }
}

fn render_student(label: &str, student: &Student) {
    println!(
        "- {label}: {} ({}) behavior {} | distinguished {} | attendance {}",
        student.full_name,
        student.student_number,
        student.scores.behavior,
        student.scores.distinguished,
        student.scores.attendance
    );
}

fn render_receipt(label: &str, receipt: &LedgerReceipt) {
    let field = receipt.event.record.kind.field();
    println!(
        "- {label}: {} {} (applied {:+}, attempts {})",
        field.label(),
        receipt.student.scores.get(field),
        receipt.event.record.applied_delta,
        receipt.attempts
    );
    if let Some(warning) = &receipt.warning {
        println!("  {}", warning.message());
    }
    if let Some(lossy) = &receipt.lossy_reversal {
        println!("  {}", lossy.message());
    }
}
