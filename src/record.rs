use chrono::{Datelike, NaiveDate};
use tracing::warn;

use crate::error::EvaluationError;
use crate::metrics;
use crate::models::{EmployeeProfile, EvaluationInput, EvaluationRecord, Goal, FUNCTION_COUNT};
use crate::schema::{ColumnKind, ColumnSchema, ProfileField};
use crate::store::SheetRecord;

/// Reads an employee profile out of a sheet row using the schema's column names.
pub fn profile_from_record(
    schema: &ColumnSchema,
    goal_count: usize,
    record: &SheetRecord,
) -> Result<EmployeeProfile, EvaluationError> {
    let text = |field: ProfileField| -> String {
        schema
            .name_of(ColumnKind::Profile(field))
            .and_then(|name| record.get(name))
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };

    let mut goals = Vec::with_capacity(goal_count);
    for i in 0..goal_count {
        let raw = text(ProfileField::GoalProgrammed(i));
        let programmed = if raw.is_empty() {
            None
        } else {
            Some(raw.parse::<f64>().map_err(|_| EvaluationError::InvalidNumber {
                column: format!("Meta {} prog", i + 1),
                value: raw.clone(),
            })?)
        };
        goals.push(Goal {
            description: text(ProfileField::GoalDescription(i)),
            programmed,
        });
    }

    Ok(EmployeeProfile {
        full_name: text(ProfileField::FullName),
        curp: text(ProfileField::Curp),
        rfc: text(ProfileField::Rfc),
        supervisor: text(ProfileField::Supervisor),
        department: text(ProfileField::Department),
        position: text(ProfileField::Position),
        level: text(ProfileField::Level),
        appointment_date: text(ProfileField::AppointmentDate),
        position_seniority: text(ProfileField::PositionSeniority),
        government_seniority: text(ProfileField::GovernmentSeniority),
        functions: (0..FUNCTION_COUNT)
            .map(|i| text(ProfileField::Function(i)))
            .collect(),
        goals,
    })
}

/// Picks the profile for `name`. The sheet is a history, so the same employee shows
/// up once per evaluation; the earliest row wins.
pub fn select_profile(
    schema: &ColumnSchema,
    goal_count: usize,
    records: &[SheetRecord],
    name: &str,
) -> Result<EmployeeProfile, EvaluationError> {
    let name_column = schema
        .name_of(ColumnKind::Profile(ProfileField::FullName))
        .unwrap_or_default();
    let mut matches = records
        .iter()
        .filter(|record| record.get(name_column).map(|v| v.trim()) == Some(name.trim()));

    let first = matches.next().ok_or_else(|| EvaluationError::EmployeeNotFound {
        name: name.to_string(),
    })?;
    let others = matches.count();
    if others > 0 {
        warn!(employee = name, rows = others + 1, "employee name matches several rows, using the first");
    }
    profile_from_record(schema, goal_count, first)
}

impl EvaluationRecord {
    /// Combines a profile with a submitted input. `today` stands in for a missing date.
    pub fn new(profile: EmployeeProfile, input: EvaluationInput, today: NaiveDate) -> Self {
        let metrics = metrics::derive(&profile, &input);
        Self {
            profile,
            date: input.date.unwrap_or(today),
            goal_actuals: input.goal_actuals,
            factor_scores: input.factor_scores,
            metrics,
            comments: input.comments,
        }
    }

    fn cell(&self, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::Profile(field) => profile_cell(&self.profile, field),
            ColumnKind::Day => self.date.day().to_string(),
            ColumnKind::Month => self.date.month().to_string(),
            ColumnKind::Year => self.date.year().to_string(),
            ColumnKind::GoalActual(i) => self
                .goal_actuals
                .get(i)
                .map(f64::to_string)
                .unwrap_or_default(),
            ColumnKind::GoalResult(i) => self
                .metrics
                .goal_results
                .get(i)
                .map(f64::to_string)
                .unwrap_or_default(),
            ColumnKind::Factor(i) => self
                .factor_scores
                .get(i)
                .map(|score| score.value().to_string())
                .unwrap_or_default(),
            ColumnKind::TotalScore => self.metrics.total_score.to_string(),
            ColumnKind::Comments => self.comments.clone(),
        }
    }
}

fn profile_cell(profile: &EmployeeProfile, field: ProfileField) -> String {
    match field {
        ProfileField::FullName => profile.full_name.clone(),
        ProfileField::Curp => profile.curp.clone(),
        ProfileField::Rfc => profile.rfc.clone(),
        ProfileField::Supervisor => profile.supervisor.clone(),
        ProfileField::Department => profile.department.clone(),
        ProfileField::Position => profile.position.clone(),
        ProfileField::Level => profile.level.clone(),
        ProfileField::AppointmentDate => profile.appointment_date.clone(),
        ProfileField::PositionSeniority => profile.position_seniority.clone(),
        ProfileField::GovernmentSeniority => profile.government_seniority.clone(),
        ProfileField::Function(i) => profile.functions.get(i).cloned().unwrap_or_default(),
        ProfileField::GoalDescription(i) => profile
            .goals
            .get(i)
            .map(|goal| goal.description.clone())
            .unwrap_or_default(),
        ProfileField::GoalProgrammed(i) => profile
            .goals
            .get(i)
            .and_then(|goal| goal.programmed)
            .map(|value| value.to_string())
            .unwrap_or_default(),
    }
}

/// Serialises `record` in schema order, then fits it to the sheet's current width.
pub fn build_record(schema: &ColumnSchema, record: &EvaluationRecord, width: usize) -> Vec<String> {
    let row = schema
        .columns()
        .iter()
        .map(|column| record.cell(column.kind))
        .collect();
    align_to_width(row, width)
}

/// Pads with empty cells or truncates so the row spans exactly `width` columns.
pub fn align_to_width(mut row: Vec<String>, width: usize) -> Vec<String> {
    row.resize(width, String::new());
    row
}
