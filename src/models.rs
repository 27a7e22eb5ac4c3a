use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{RubricConfig, FACTOR_MAX};
use crate::error::EvaluationError;

/// Number of job-function descriptions a profile carries.
pub const FUNCTION_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub description: String,
    /// `None` when the sheet cell is empty.
    pub programmed: Option<f64>,
}

/// Static attributes of an employee as stored in the sheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmployeeProfile {
    pub full_name: String,
    pub curp: String,
    pub rfc: String,
    pub supervisor: String,
    pub department: String,
    pub position: String,
    pub level: String,
    pub appointment_date: String,
    pub position_seniority: String,
    pub government_seniority: String,
    pub functions: Vec<String>,
    pub goals: Vec<Goal>,
}

/// A rubric factor score, always within `1..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FactorScore(u8);

impl FactorScore {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for FactorScore {
    type Error = EvaluationError;

    fn try_from(score: u8) -> Result<Self, Self::Error> {
        if (1..=FACTOR_MAX).contains(&score) {
            Ok(FactorScore(score))
        } else {
            Err(EvaluationError::FactorOutOfRange { score })
        }
    }
}

/// What the evaluator fills in for one employee.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationInput {
    pub goal_actuals: Vec<f64>,
    pub factor_scores: Vec<FactorScore>,
    pub comments: String,
    pub date: Option<NaiveDate>,
}

impl EvaluationInput {
    pub fn validate(&self, rubric: &RubricConfig) -> Result<(), EvaluationError> {
        if self.goal_actuals.len() != rubric.goal_count {
            return Err(EvaluationError::GoalCount {
                expected: rubric.goal_count,
                actual: self.goal_actuals.len(),
            });
        }
        if self.factor_scores.len() != rubric.factors.len() {
            return Err(EvaluationError::FactorCount {
                expected: rubric.factors.len(),
                actual: self.factor_scores.len(),
            });
        }
        if let Some((index, value)) = self
            .goal_actuals
            .iter()
            .enumerate()
            .find(|(_, value)| !value.is_finite() || **value < 0.0)
        {
            return Err(EvaluationError::InvalidActual {
                goal: index + 1,
                value: *value,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub goal_results: Vec<f64>,
    pub total_score: u32,
}

/// One evaluation ready to be serialised into a sheet row.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub profile: EmployeeProfile,
    pub date: NaiveDate,
    pub goal_actuals: Vec<f64>,
    pub factor_scores: Vec<FactorScore>,
    pub metrics: DerivedMetrics,
    pub comments: String,
}

/// A stored evaluation as the administrator report reads it back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreEntry {
    pub employee: String,
    pub department: String,
    pub date: NaiveDate,
    pub total_score: u32,
    pub goal_results: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeSummary {
    pub employee: String,
    pub department: String,
    pub evaluations: usize,
    pub avg_score: f64,
    pub latest_score: u32,
    pub latest_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentSummary {
    pub department: String,
    pub evaluations: usize,
    pub employees: usize,
    pub avg_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(goals: usize, factors: usize) -> EvaluationInput {
        EvaluationInput {
            goal_actuals: vec![1.0; goals],
            factor_scores: vec![FactorScore::try_from(2).unwrap(); factors],
            comments: String::new(),
            date: None,
        }
    }

    #[test]
    fn factor_scores_outside_scale_are_rejected() {
        assert!(FactorScore::try_from(1).is_ok());
        assert!(FactorScore::try_from(4).is_ok());
        assert_eq!(
            FactorScore::try_from(0),
            Err(EvaluationError::FactorOutOfRange { score: 0 })
        );
        assert_eq!(
            FactorScore::try_from(5),
            Err(EvaluationError::FactorOutOfRange { score: 5 })
        );
    }

    #[test]
    fn validate_checks_goal_and_factor_counts() {
        let rubric = RubricConfig::default();
        assert!(input(4, 12).validate(&rubric).is_ok());
        assert_eq!(
            input(3, 12).validate(&rubric),
            Err(EvaluationError::GoalCount {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(
            input(4, 11).validate(&rubric),
            Err(EvaluationError::FactorCount {
                expected: 12,
                actual: 11
            })
        );
    }

    #[test]
    fn validate_rejects_negative_actuals() {
        let rubric = RubricConfig::default();
        let mut candidate = input(4, 12);
        candidate.goal_actuals[2] = -1.5;
        assert_eq!(
            candidate.validate(&rubric),
            Err(EvaluationError::InvalidActual {
                goal: 3,
                value: -1.5
            })
        );
    }

    #[test]
    fn validate_rejects_non_finite_actuals() {
        let rubric = RubricConfig::default();
        let mut candidate = input(4, 12);
        candidate.goal_actuals[0] = f64::INFINITY;
        assert_eq!(
            candidate.validate(&rubric),
            Err(EvaluationError::InvalidActual {
                goal: 1,
                value: f64::INFINITY
            })
        );

        candidate.goal_actuals[0] = f64::NAN;
        assert!(matches!(
            candidate.validate(&rubric),
            Err(EvaluationError::InvalidActual { goal: 1, .. })
        ));
    }
}
