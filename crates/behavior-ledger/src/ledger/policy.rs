use serde::{Deserialize, Serialize};

use super::domain::{ScoreCard, ScoreField};

/// Inclusive domain of one aggregate plus its starting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub min: i32,
    pub max: i32,
    pub initial: i32,
}

impl ScoreBand {
    pub const fn new(min: i32, max: i32, initial: i32) -> Self {
        Self { min, max, initial }
    }

    /// Clamp `value + delta` into the band, reporting when a bound was hit.
    pub fn settle(&self, field: ScoreField, value: i32, delta: i32) -> Settlement {
        let naive = value.saturating_add(delta);
        let settled = naive.clamp(self.min, self.max);

        let warning = if settled == naive {
            None
        } else {
            Some(ClampedWarning {
                field,
                bound: if naive < self.min {
                    Bound::Floor
                } else {
                    Bound::Ceiling
                },
                naive,
                settled,
            })
        };

        Settlement { value: settled, warning }
    }
}

/// Result of moving an aggregate inside its band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub value: i32,
    pub warning: Option<ClampedWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Floor,
    Ceiling,
}

/// Non-fatal notice that a floor or ceiling absorbed part of a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampedWarning {
    pub field: ScoreField,
    pub bound: Bound,
    pub naive: i32,
    pub settled: i32,
}

impl ClampedWarning {
    pub fn message(&self) -> String {
        let bound = match self.bound {
            Bound::Floor => "floor",
            Bound::Ceiling => "ceiling",
        };
        format!(
            "{} reached its {} ({} held at {})",
            self.field.label(),
            bound,
            self.naive,
            self.settled
        )
    }
}

/// Bands and per-event ceilings shared by every ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePolicy {
    pub behavior: ScoreBand,
    pub distinguished: ScoreBand,
    pub attendance: ScoreBand,
    pub max_incident_points: u32,
    pub max_positive_points: u32,
    pub max_absence_points: u32,
}

impl ScorePolicy {
    pub fn standard() -> Self {
        Self {
            behavior: ScoreBand::new(0, 100, 80),
            distinguished: ScoreBand::new(0, 20, 0),
            attendance: ScoreBand::new(0, 100, 100),
            max_incident_points: 100,
            max_positive_points: 20,
            max_absence_points: 100,
        }
    }

    pub const fn band(&self, field: ScoreField) -> &ScoreBand {
        match field {
            ScoreField::Behavior => &self.behavior,
            ScoreField::Distinguished => &self.distinguished,
            ScoreField::Attendance => &self.attendance,
        }
    }

    pub fn initial_scores(&self) -> ScoreCard {
        ScoreCard {
            behavior: self.behavior.initial,
            distinguished: self.distinguished.initial,
            attendance: self.attendance.initial,
        }
    }

    pub fn settle(&self, field: ScoreField, value: i32, delta: i32) -> Settlement {
        self.band(field).settle(field, value, delta)
    }
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_inside_band_has_no_warning() {
        let policy = ScorePolicy::standard();
        let settlement = policy.settle(ScoreField::Behavior, 80, -10);
        assert_eq!(settlement.value, 70);
        assert!(settlement.warning.is_none());
    }

    #[test]
    fn settle_reports_floor() {
        let policy = ScorePolicy::standard();
        let settlement = policy.settle(ScoreField::Behavior, 5, -12);
        assert_eq!(settlement.value, 0);
        let warning = settlement.warning.expect("floor reached");
        assert_eq!(warning.bound, Bound::Floor);
        assert_eq!(warning.naive, -7);
        assert!(warning.message().contains("floor"));
    }

    #[test]
    fn distinguished_cap_is_a_ceiling() {
        let policy = ScorePolicy::standard();
        let settlement = policy.settle(ScoreField::Distinguished, 15, 10);
        assert_eq!(settlement.value, 20);
        assert_eq!(
            settlement.warning.map(|warning| warning.bound),
            Some(Bound::Ceiling)
        );
    }

    #[test]
    fn settlement_is_monotonic_in_delta() {
        let policy = ScorePolicy::standard();
        for start in [0, 7, 19, 20] {
            let mut previous = i32::MIN;
            for points in 0..30 {
                let value = policy.settle(ScoreField::Distinguished, start, points).value;
                assert!(value >= previous, "start {start} points {points}");
                previous = value;
            }
        }
        for start in [0, 40, 100] {
            let mut previous = i32::MAX;
            for points in 0..120 {
                let value = policy.settle(ScoreField::Behavior, start, -points).value;
                assert!(value <= previous, "start {start} points {points}");
                previous = value;
            }
        }
    }
}
