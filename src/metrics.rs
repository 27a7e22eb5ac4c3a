use crate::models::{DerivedMetrics, EmployeeProfile, EvaluationInput, FactorScore};

/// Completion of a goal as a percentage of its programmed value, rounded to two decimals.
///
/// A goal with nothing programmed yields `0.0` instead of dividing by zero.
/// Over-achievement is kept as is, so results above 100 are valid.
pub fn percent_complete(actual: f64, programmed: f64) -> f64 {
    if programmed == 0.0 {
        return 0.0;
    }
    round2(actual / programmed * 100.0)
}

pub fn aggregate_score(factors: &[FactorScore]) -> u32 {
    factors.iter().map(|score| score.value() as u32).sum()
}

pub fn derive(profile: &EmployeeProfile, input: &EvaluationInput) -> DerivedMetrics {
    let goal_results = input
        .goal_actuals
        .iter()
        .enumerate()
        .map(|(index, actual)| {
            let programmed = profile
                .goals
                .get(index)
                .and_then(|goal| goal.programmed)
                .unwrap_or(0.0);
            percent_complete(*actual, programmed)
        })
        .collect();

    DerivedMetrics {
        goal_results,
        total_score: aggregate_score(&input.factor_scores),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Goal;

    fn scores(values: &[u8]) -> Vec<FactorScore> {
        values
            .iter()
            .map(|v| FactorScore::try_from(*v).unwrap())
            .collect()
    }

    #[test]
    fn percent_complete_matches_rounded_ratio() {
        assert_eq!(percent_complete(45.0, 100.0), 45.0);
        assert_eq!(percent_complete(1.0, 3.0), 33.33);
        assert_eq!(percent_complete(2.0, 3.0), 66.67);
        assert_eq!(percent_complete(7.5, 12.0), 62.5);
    }

    #[test]
    fn percent_complete_is_zero_without_programmed_value() {
        assert_eq!(percent_complete(10.0, 0.0), 0.0);
        assert_eq!(percent_complete(0.0, 0.0), 0.0);
    }

    #[test]
    fn percent_complete_is_not_clamped() {
        assert_eq!(percent_complete(150.0, 100.0), 150.0);
    }

    #[test]
    fn aggregate_score_spans_rubric_range() {
        assert_eq!(aggregate_score(&scores(&[4; 12])), 48);
        assert_eq!(aggregate_score(&scores(&[1; 12])), 12);
        let mixed = scores(&[1, 2, 3, 4, 1, 2, 3, 4, 1, 2, 3, 4]);
        let total = aggregate_score(&mixed);
        assert_eq!(total, 30);
        assert!((12..=48).contains(&total));
    }

    #[test]
    fn derive_uses_profile_goals_in_order() {
        let profile = EmployeeProfile {
            goals: vec![
                Goal {
                    description: "Informes".to_string(),
                    programmed: Some(100.0),
                },
                Goal {
                    description: String::new(),
                    programmed: None,
                },
            ],
            ..EmployeeProfile::default()
        };
        let input = EvaluationInput {
            goal_actuals: vec![45.0, 10.0, 3.0],
            factor_scores: scores(&[3; 12]),
            comments: String::new(),
            date: None,
        };

        let metrics = derive(&profile, &input);
        assert_eq!(metrics.goal_results, vec![45.0, 0.0, 0.0]);
        assert_eq!(metrics.total_score, 36);
    }
}
