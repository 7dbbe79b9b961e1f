use serde::{Deserialize, Deserializer};
use std::io::Read;

use crate::ledger::{NewStudent, StudentNumber};

/// One roster line with its 1-based data row number.
#[derive(Debug)]
pub(crate) struct RosterRecord {
    pub(crate) line: usize,
    pub(crate) student: NewStudent,
}

pub(crate) fn parse_records<R: Read>(reader: R) -> Result<Vec<RosterRecord>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for (index, record) in csv_reader.deserialize::<RosterRow>().enumerate() {
        let row = record?;
        records.push(RosterRecord {
            line: index + 1,
            student: NewStudent {
                student_number: StudentNumber(row.student_number),
                full_name: row.full_name,
                grade: row.grade,
                class_name: row.class_name,
            },
        });
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    #[serde(rename = "Student Number")]
    student_number: String,
    #[serde(rename = "Full Name")]
    full_name: String,
    #[serde(rename = "Grade", default, deserialize_with = "empty_string_as_none")]
    grade: Option<String>,
    #[serde(rename = "Class", default, deserialize_with = "empty_string_as_none")]
    class_name: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
