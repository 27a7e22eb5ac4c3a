use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use chrono::NaiveDate;

use crate::config::RubricConfig;
use crate::models::{DepartmentSummary, EmployeeSummary, ScoreEntry};
use crate::schema::{ColumnKind, ColumnSchema, ProfileField};
use crate::store::SheetRecord;

const BAR_WIDTH: u32 = 24;

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub department: Option<String>,
    pub employee: Option<String>,
}

impl ReportFilter {
    fn label(&self) -> String {
        match (&self.department, &self.employee) {
            (Some(department), Some(employee)) => format!("{employee} ({department})"),
            (Some(department), None) => department.clone(),
            (None, Some(employee)) => employee.clone(),
            (None, None) => "all departments".to_string(),
        }
    }
}

fn column<'a>(schema: &ColumnSchema, record: &'a SheetRecord, kind: ColumnKind) -> &'a str {
    schema
        .name_of(kind)
        .and_then(|name| record.get(name))
        .map(|value| value.trim())
        .unwrap_or("")
}

/// Distinct employee names in sheet order, optionally limited to one department.
pub fn list_employees(
    schema: &ColumnSchema,
    records: &[SheetRecord],
    department: Option<&str>,
) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for record in records {
        let name = column(schema, record, ColumnKind::Profile(ProfileField::FullName));
        let area = column(schema, record, ColumnKind::Profile(ProfileField::Department));
        if name.is_empty() || department.is_some_and(|wanted| wanted != area) {
            continue;
        }
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }
    names
}

/// Rows that carry a completed evaluation. Profile-only rows and rows with an
/// unreadable date or score are skipped.
pub fn score_entries(
    schema: &ColumnSchema,
    rubric: &RubricConfig,
    records: &[SheetRecord],
    filter: &ReportFilter,
) -> Vec<ScoreEntry> {
    let mut entries = Vec::new();
    for record in records {
        let employee = column(schema, record, ColumnKind::Profile(ProfileField::FullName));
        let department = column(schema, record, ColumnKind::Profile(ProfileField::Department));
        if filter.department.as_deref().is_some_and(|d| d != department)
            || filter.employee.as_deref().is_some_and(|e| e != employee)
        {
            continue;
        }

        let Ok(total_score) = column(schema, record, ColumnKind::TotalScore).parse::<u32>() else {
            continue;
        };
        let date = (|| {
            let day = column(schema, record, ColumnKind::Day).parse().ok()?;
            let month = column(schema, record, ColumnKind::Month).parse().ok()?;
            let year = column(schema, record, ColumnKind::Year).parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })();
        let Some(date) = date else {
            continue;
        };

        let goal_results = (0..rubric.goal_count)
            .map(|i| {
                column(schema, record, ColumnKind::GoalResult(i))
                    .parse::<f64>()
                    .unwrap_or(0.0)
            })
            .collect();

        entries.push(ScoreEntry {
            employee: employee.to_string(),
            department: department.to_string(),
            date,
            total_score,
            goal_results,
        });
    }
    entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.employee.cmp(&b.employee)));
    entries
}

pub fn summarize_by_employee(entries: &[ScoreEntry]) -> Vec<EmployeeSummary> {
    let mut map: HashMap<&str, EmployeeSummary> = HashMap::new();
    let mut totals: HashMap<&str, u32> = HashMap::new();

    for entry in entries {
        let summary = map
            .entry(entry.employee.as_str())
            .or_insert_with(|| EmployeeSummary {
                employee: entry.employee.clone(),
                department: entry.department.clone(),
                evaluations: 0,
                avg_score: 0.0,
                latest_score: entry.total_score,
                latest_date: entry.date,
            });
        summary.evaluations += 1;
        if entry.date >= summary.latest_date {
            summary.latest_date = entry.date;
            summary.latest_score = entry.total_score;
        }
        *totals.entry(entry.employee.as_str()).or_insert(0) += entry.total_score;
    }

    let mut summaries: Vec<EmployeeSummary> = map
        .into_iter()
        .map(|(name, mut summary)| {
            summary.avg_score = totals[name] as f64 / summary.evaluations as f64;
            summary
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.avg_score
            .partial_cmp(&a.avg_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.employee.cmp(&b.employee))
    });
    summaries
}

pub fn summarize_by_department(entries: &[ScoreEntry]) -> Vec<DepartmentSummary> {
    let mut map: HashMap<&str, (usize, u32, BTreeSet<&str>)> = HashMap::new();
    for entry in entries {
        let slot = map
            .entry(entry.department.as_str())
            .or_insert_with(|| (0, 0, BTreeSet::new()));
        slot.0 += 1;
        slot.1 += entry.total_score;
        slot.2.insert(entry.employee.as_str());
    }

    let mut summaries: Vec<DepartmentSummary> = map
        .into_iter()
        .map(|(department, (count, total, employees))| DepartmentSummary {
            department: department.to_string(),
            evaluations: count,
            employees: employees.len(),
            avg_score: if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            },
        })
        .collect();
    summaries.sort_by(|a, b| a.department.cmp(&b.department));
    summaries
}

fn bar(score: u32, max_score: u32) -> String {
    if max_score == 0 {
        return String::new();
    }
    let filled = (score.min(max_score) * BAR_WIDTH + max_score / 2) / max_score;
    format!(
        "{}{}",
        "█".repeat(filled as usize),
        "░".repeat((BAR_WIDTH - filled) as usize)
    )
}

pub fn build_report(filter: &ReportFilter, rubric: &RubricConfig, entries: &[ScoreEntry]) -> String {
    let max_score = rubric.max_score();
    let mut output = String::new();

    let _ = writeln!(output, "# Performance Evaluation Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} evaluations, scores from {} to {})",
        filter.label(),
        entries.len(),
        rubric.min_score(),
        max_score
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Department Averages");

    let departments = summarize_by_department(entries);
    if departments.is_empty() {
        let _ = writeln!(output, "No evaluations recorded for this selection.");
    } else {
        for summary in departments.iter() {
            let _ = writeln!(
                output,
                "- {}: avg {:.1}/{} across {} evaluations of {} employees",
                summary.department,
                summary.avg_score,
                max_score,
                summary.evaluations,
                summary.employees
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Employees");

    let employees = summarize_by_employee(entries);
    if employees.is_empty() {
        let _ = writeln!(output, "No evaluations recorded for this selection.");
    } else {
        for summary in employees.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): avg {:.1}/{}, latest {}/{} on {} ({} evaluations)",
                summary.employee,
                summary.department,
                summary.avg_score,
                max_score,
                summary.latest_score,
                max_score,
                summary.latest_date,
                summary.evaluations
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Score History");

    if entries.is_empty() {
        let _ = writeln!(output, "No evaluations recorded for this selection.");
    } else {
        let _ = writeln!(output, "```");
        for entry in entries.iter() {
            let _ = writeln!(
                output,
                "{} {:>2}/{} {} {}",
                entry.date,
                entry.total_score,
                max_score,
                bar(entry.total_score, max_score),
                entry.employee
            );
        }
        let _ = writeln!(output, "```");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ColumnSchema {
        ColumnSchema::canonical(&RubricConfig::default())
    }

    fn evaluation(name: &str, area: &str, date: (i32, u32, u32), total: &str) -> SheetRecord {
        let mut record = SheetRecord::new();
        record.insert("Nombre(s) y Apellidos:".to_string(), name.to_string());
        record.insert("Área de Adscripción:".to_string(), area.to_string());
        record.insert("Año".to_string(), date.0.to_string());
        record.insert("Mes".to_string(), date.1.to_string());
        record.insert("Día".to_string(), date.2.to_string());
        record.insert("Resultado 1".to_string(), "45".to_string());
        record.insert("Puntaje total".to_string(), total.to_string());
        record
    }

    fn profile_only(name: &str, area: &str) -> SheetRecord {
        let mut record = SheetRecord::new();
        record.insert("Nombre(s) y Apellidos:".to_string(), name.to_string());
        record.insert("Área de Adscripción:".to_string(), area.to_string());
        record
    }

    fn records() -> Vec<SheetRecord> {
        vec![
            profile_only("Ana Torres", "Finanzas"),
            profile_only("Luis Gómez", "Auditoría"),
            evaluation("Ana Torres", "Finanzas", (2025, 6, 30), "36"),
            evaluation("Ana Torres", "Finanzas", (2026, 1, 15), "44"),
            evaluation("Luis Gómez", "Auditoría", (2026, 1, 10), "30"),
            evaluation("Sofía Ruiz", "Finanzas", (2026, 2, 1), "not a number"),
        ]
    }

    #[test]
    fn employees_are_distinct_and_filterable() {
        let schema = schema();
        let all = list_employees(&schema, &records(), None);
        assert_eq!(all, vec!["Ana Torres", "Luis Gómez", "Sofía Ruiz"]);
        let finance = list_employees(&schema, &records(), Some("Finanzas"));
        assert_eq!(finance, vec!["Ana Torres", "Sofía Ruiz"]);
    }

    #[test]
    fn entries_skip_rows_without_a_readable_evaluation() {
        let entries = score_entries(
            &schema(),
            &RubricConfig::default(),
            &records(),
            &ReportFilter::default(),
        );
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].date, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        assert_eq!(entries[0].goal_results, vec![45.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn filter_limits_entries_by_department_and_employee() {
        let schema = schema();
        let rubric = RubricConfig::default();
        let audit = ReportFilter {
            department: Some("Auditoría".to_string()),
            employee: None,
        };
        assert_eq!(score_entries(&schema, &rubric, &records(), &audit).len(), 1);

        let ana = ReportFilter {
            department: Some("Finanzas".to_string()),
            employee: Some("Ana Torres".to_string()),
        };
        let entries = score_entries(&schema, &rubric, &records(), &ana);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.employee == "Ana Torres"));
    }

    #[test]
    fn employee_summary_tracks_average_and_latest() {
        let entries = score_entries(
            &schema(),
            &RubricConfig::default(),
            &records(),
            &ReportFilter::default(),
        );
        let summaries = summarize_by_employee(&entries);
        assert_eq!(summaries[0].employee, "Ana Torres");
        assert!((summaries[0].avg_score - 40.0).abs() < 0.001);
        assert_eq!(summaries[0].latest_score, 44);
        assert_eq!(summaries[0].evaluations, 2);
        assert_eq!(summaries[1].employee, "Luis Gómez");
    }

    #[test]
    fn department_summary_counts_employees() {
        let entries = score_entries(
            &schema(),
            &RubricConfig::default(),
            &records(),
            &ReportFilter::default(),
        );
        let summaries = summarize_by_department(&entries);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].department, "Finanzas");
        assert_eq!(summaries[1].employees, 1);
        assert_eq!(summaries[1].evaluations, 2);
    }

    #[test]
    fn bars_scale_to_max_score() {
        assert_eq!(bar(48, 48).chars().filter(|c| *c == '█').count(), 24);
        assert_eq!(bar(12, 48).chars().filter(|c| *c == '█').count(), 6);
        assert_eq!(bar(0, 48).chars().count(), 24);
    }

    #[test]
    fn report_uses_configured_max_score() {
        let rubric = RubricConfig::default();
        let entries = score_entries(&schema(), &rubric, &records(), &ReportFilter::default());
        let report = build_report(&ReportFilter::default(), &rubric, &entries);
        assert!(report.contains("scores from 12 to 48"));
        assert!(report.contains("- Ana Torres (Finanzas): avg 40.0/48, latest 44/48 on 2026-01-15"));
        assert!(!report.contains("/24"));
    }

    #[test]
    fn empty_selection_reports_nothing_recorded() {
        let report = build_report(&ReportFilter::default(), &RubricConfig::default(), &[]);
        assert!(report.contains("No evaluations recorded for this selection."));
    }
}
