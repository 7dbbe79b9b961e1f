use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{ScoredEvent, Student, StudentId, StudentNumber};

/// Read-only projection of a student for tables and report cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentView {
    pub student_id: StudentId,
    pub student_number: StudentNumber,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub behavior_score: i32,
    pub distinguished_score: i32,
    pub attendance_score: i32,
    pub combined_total: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawn_on: Option<NaiveDate>,
}

impl From<&Student> for StudentView {
    fn from(student: &Student) -> Self {
        Self {
            student_id: student.id.clone(),
            student_number: student.student_number.clone(),
            full_name: student.full_name.clone(),
            grade: student.grade.clone(),
            class_name: student.class_name.clone(),
            behavior_score: student.scores.behavior,
            distinguished_score: student.scores.distinguished,
            attendance_score: student.scores.attendance,
            combined_total: student.combined_total(),
            withdrawn_on: student.withdrawn_on,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreCardView {
    pub student: StudentView,
    pub events: Vec<ScoredEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandingEntry {
    pub rank: usize,
    pub student: StudentView,
}

/// Rank students by behavior score, then combined total, then student number.
pub fn standings(students: &[Student]) -> Vec<StandingEntry> {
    let mut ordered: Vec<&Student> = students.iter().collect();
    ordered.sort_by(|a, b| {
        b.scores
            .behavior
            .cmp(&a.scores.behavior)
            .then_with(|| b.combined_total().cmp(&a.combined_total()))
            .then_with(|| a.student_number.cmp(&b.student_number))
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, student)| StandingEntry {
            rank: index + 1,
            student: StudentView::from(student),
        })
        .collect()
}
