//! Grade-letter mapping.
//!
//! The boundary table is data, not logic, so an institution can swap it
//! through configuration without touching the scoring engine.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigIssue, ConfigurationError};

/// One step of the grade table: percentages at or above `min_percent` earn `letter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub min_percent: f64,
    pub letter: String,
}

impl GradeBand {
    pub fn new(min_percent: f64, letter: impl Into<String>) -> Self {
        Self {
            min_percent,
            letter: letter.into(),
        }
    }
}

/// Monotonic step function from percentage to grade letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeScale {
    /// Bands in strictly descending `min_percent` order.
    pub bands: Vec<GradeBand>,
    /// Letter for percentages below every band.
    pub floor: String,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self {
            bands: vec![
                GradeBand::new(97.0, "A+"),
                GradeBand::new(93.0, "A"),
                GradeBand::new(90.0, "A-"),
                GradeBand::new(87.0, "B+"),
                GradeBand::new(83.0, "B"),
                GradeBand::new(80.0, "B-"),
                GradeBand::new(77.0, "C+"),
                GradeBand::new(73.0, "C"),
                GradeBand::new(70.0, "C-"),
                GradeBand::new(67.0, "D+"),
                GradeBand::new(65.0, "D"),
            ],
            floor: "F".to_string(),
        }
    }
}

impl GradeScale {
    /// Letter earned by `percentage`.
    pub fn letter_for(&self, percentage: f64) -> &str {
        self.bands
            .iter()
            .find(|band| percentage >= band.min_percent)
            .map(|band| band.letter.as_str())
            .unwrap_or(&self.floor)
    }

    /// Reject tables that are not a monotonic step function.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut issues = Vec::new();
        if self.floor.trim().is_empty() {
            issues.push(ConfigIssue::quiz("grade scale floor letter is empty"));
        }
        for band in &self.bands {
            if !band.min_percent.is_finite() || !(0.0..=100.0).contains(&band.min_percent) {
                issues.push(ConfigIssue::quiz(format!(
                    "grade band {} has out-of-range threshold {}",
                    band.letter, band.min_percent
                )));
            }
            if band.letter.trim().is_empty() {
                issues.push(ConfigIssue::quiz("grade band with an empty letter"));
            }
        }
        for pair in self.bands.windows(2) {
            if pair[0].min_percent <= pair[1].min_percent {
                issues.push(ConfigIssue::quiz(format!(
                    "grade bands must be strictly descending: {} ({}) before {} ({})",
                    pair[0].letter, pair[0].min_percent, pair[1].letter, pair[1].min_percent
                )));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError {
                quiz_id: "grade_scale".into(),
                issues,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_boundaries() {
        let scale = GradeScale::default();
        assert_eq!(scale.letter_for(100.0), "A+");
        assert_eq!(scale.letter_for(97.0), "A+");
        assert_eq!(scale.letter_for(96.99), "A");
        assert_eq!(scale.letter_for(80.0), "B-");
        assert_eq!(scale.letter_for(65.0), "D");
        assert_eq!(scale.letter_for(64.9), "F");
        assert_eq!(scale.letter_for(0.0), "F");
        assert!(scale.validate().is_ok());
    }

    #[test]
    fn custom_scale_is_swappable() {
        let scale = GradeScale {
            bands: vec![GradeBand::new(50.0, "pass")],
            floor: "fail".into(),
        };
        assert_eq!(scale.letter_for(50.0), "pass");
        assert_eq!(scale.letter_for(49.0), "fail");
    }

    #[test]
    fn non_monotonic_scale_is_rejected() {
        let scale = GradeScale {
            bands: vec![GradeBand::new(60.0, "B"), GradeBand::new(80.0, "A")],
            floor: "F".into(),
        };
        let err = scale.validate().unwrap_err();
        assert!(err.issues[0].message.contains("strictly descending"));
    }
}
