use std::sync::{Arc, Mutex};

use behavior_ledger::config::LedgerConfig;
use behavior_ledger::ledger::{
    AuditEntry, AuditError, AuditSink, DraftKind, EventDraft, EventRevision, InMemoryLedgerStore,
    LedgerService, NewStudent, StudentNumber, StudentRef,
};
use chrono::NaiveDate;

#[derive(Default)]
struct CollectingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditSink for CollectingAudit {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Transport("poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

fn school_day(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, day).expect("valid school day")
}

fn by_number(number: &str) -> StudentRef {
    StudentRef::Number(StudentNumber(number.to_string()))
}

#[test]
fn term_of_events_stays_reconciled() {
    let store = Arc::new(InMemoryLedgerStore::default());
    let audit = Arc::new(CollectingAudit::default());
    let service = LedgerService::new(store, audit.clone(), LedgerConfig::default());

    let student = service
        .register_student(NewStudent {
            student_number: StudentNumber("7001".to_string()),
            full_name: "Rosa Lima".to_string(),
            grade: Some("9".to_string()),
            class_name: Some("9C".to_string()),
        })
        .expect("registered");

    let late = service
        .record_event(EventDraft {
            student: by_number("7001"),
            date: school_day(1),
            kind: DraftKind::Incident {
                misconduct_code: "LATE_ARRIVAL".to_string(),
                degree: None,
                points: None,
            },
            rationale: "third late arrival this week".to_string(),
            evidence: None,
        })
        .expect("late arrival");
    assert_eq!(late.student.scores.behavior, 78);

    let honor = service
        .record_event(EventDraft {
            student: by_number("7001"),
            date: school_day(3),
            kind: DraftKind::PositiveAction {
                action_code: "ACADEMIC_HONOR".to_string(),
                points: None,
            },
            rationale: "honor roll".to_string(),
            evidence: None,
        })
        .expect("honor roll");
    assert_eq!(honor.student.scores.distinguished, 10);

    let absence = service
        .record_event(EventDraft {
            student: by_number("7001"),
            date: school_day(6),
            kind: DraftKind::Absence {
                points: 3,
                has_excuse: false,
            },
            rationale: String::new(),
            evidence: None,
        })
        .expect("absence");
    assert_eq!(absence.student.scores.attendance, 97);

    service
        .excuse_absence(&absence.event.id)
        .expect("doctor's note arrived");

    service
        .revise_event(
            &late.event.id,
            EventRevision {
                date: school_day(1),
                kind: DraftKind::Incident {
                    misconduct_code: "LATE_ARRIVAL".to_string(),
                    degree: Some(1),
                    points: Some(1),
                },
                rationale: "bus delay confirmed".to_string(),
                evidence: Some("transport-log.pdf".to_string()),
            },
        )
        .expect("revised");

    let card = service.score_card(&student.id).expect("score card");
    assert_eq!(card.student.behavior_score, 79);
    assert_eq!(card.student.distinguished_score, 10);
    assert_eq!(card.student.attendance_score, 100);
    assert_eq!(card.student.combined_total, 89);
    assert_eq!(card.events.len(), 3);

    let report = service.reconcile(&student.id).expect("reconciled");
    assert!(report.is_consistent());

    let entries = audit.entries.lock().expect("audit entries");
    assert_eq!(entries.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_reversal_restores_every_student() {
    let store = Arc::new(InMemoryLedgerStore::default());
    let service = Arc::new(LedgerService::new(
        store,
        Arc::new(CollectingAudit::default()),
        LedgerConfig {
            max_write_attempts: 5,
            batch_parallelism: 3,
        },
    ));

    let mut event_ids = Vec::new();
    for index in 0..5 {
        let number = format!("80{index:02}");
        service
            .register_student(NewStudent {
                student_number: StudentNumber(number.clone()),
                full_name: format!("Student {index}"),
                grade: None,
                class_name: None,
            })
            .expect("registered");

        for day in 1..=3 {
            let receipt = service
                .record_event(EventDraft {
                    student: by_number(&number),
                    date: school_day(day),
                    kind: DraftKind::Incident {
                        misconduct_code: "PHONE_USE".to_string(),
                        degree: None,
                        points: None,
                    },
                    rationale: String::new(),
                    evidence: None,
                })
                .expect("incident");
            event_ids.push(receipt.event.id);
        }
    }

    let report = Arc::clone(&service).reverse_many(event_ids).await;
    assert_eq!(report.reversed.len(), 15);
    assert!(report.failures.is_empty());

    let standings = service.standings().expect("standings");
    assert_eq!(standings.len(), 5);
    assert!(standings
        .iter()
        .all(|entry| entry.student.behavior_score == 80));
}
