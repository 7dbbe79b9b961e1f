use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Misconduct type from the school's conduct code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconductType {
    pub code: String,
    pub label: String,
    pub degree: u8,
    pub points: u32,
}

/// Read-only lookup of misconduct types by code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconductCatalog {
    entries: BTreeMap<String, MisconductType>,
}

impl MisconductCatalog {
    pub fn new(entries: impl IntoIterator<Item = MisconductType>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.code.clone(), entry))
                .collect(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&MisconductType> {
        self.entries.get(code)
    }

    /// Default deduction for a degree when no catalog entry is named.
    pub fn points_for_degree(degree: u8) -> Option<u32> {
        match degree {
            1 => Some(2),
            2 => Some(4),
            3 => Some(8),
            4 => Some(12),
            5 => Some(15),
            _ => None,
        }
    }

    pub fn standard() -> Self {
        let entry = |code: &str, label: &str, degree: u8| MisconductType {
            code: code.to_string(),
            label: label.to_string(),
            degree,
            points: Self::points_for_degree(degree).unwrap_or(0),
        };

        Self::new([
            entry("LATE_ARRIVAL", "Repeated late arrival", 1),
            entry("UNIFORM", "Uniform violation", 1),
            entry("DISRUPTION", "Classroom disruption", 2),
            entry("PHONE_USE", "Unauthorized phone use", 2),
            entry("CHEATING", "Academic dishonesty", 3),
            entry("BULLYING", "Bullying or harassment", 4),
            entry("VANDALISM", "Damage to school property", 4),
            entry("ASSAULT", "Physical assault", 5),
        ])
    }
}

/// Positive-behavior action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositiveActionType {
    pub code: String,
    pub label: String,
    pub points: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositiveActionCatalog {
    entries: BTreeMap<String, PositiveActionType>,
}

impl PositiveActionCatalog {
    pub fn new(entries: impl IntoIterator<Item = PositiveActionType>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.code.clone(), entry))
                .collect(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&PositiveActionType> {
        self.entries.get(code)
    }

    pub fn standard() -> Self {
        let entry = |code: &str, label: &str, points: u32| PositiveActionType {
            code: code.to_string(),
            label: label.to_string(),
            points,
        };

        Self::new([
            entry("PEER_MENTORING", "Peer mentoring", 5),
            entry("COMMUNITY_SERVICE", "Community service", 5),
            entry("COMPETITION_AWARD", "Competition award", 10),
            entry("ACADEMIC_HONOR", "Academic honor roll", 10),
        ])
    }
}

/// Reference data supplied to the ledger by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCatalogs {
    pub misconduct: MisconductCatalog,
    pub positive_actions: PositiveActionCatalog,
}

impl ReferenceCatalogs {
    pub fn standard() -> Self {
        Self {
            misconduct: MisconductCatalog::standard(),
            positive_actions: PositiveActionCatalog::standard(),
        }
    }
}
