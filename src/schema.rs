use tracing::{info, warn};

use crate::config::RubricConfig;
use crate::error::{SchemaError, StoreError};
use crate::models::FUNCTION_COUNT;
use crate::store::SheetStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    FullName,
    Curp,
    Rfc,
    Supervisor,
    Department,
    Position,
    Level,
    AppointmentDate,
    PositionSeniority,
    GovernmentSeniority,
    Function(usize),
    GoalDescription(usize),
    GoalProgrammed(usize),
}

/// The field a column serialises. Indices are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Profile(ProfileField),
    Day,
    Month,
    Year,
    GoalActual(usize),
    GoalResult(usize),
    Factor(usize),
    TotalScore,
    Comments,
}

impl ColumnKind {
    pub fn is_base(self) -> bool {
        matches!(self, ColumnKind::Profile(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

const IDENTITY_COLUMNS: [(&str, ProfileField); 10] = [
    ("Nombre(s) y Apellidos:", ProfileField::FullName),
    ("C.U.R.P.", ProfileField::Curp),
    ("R.F.C.", ProfileField::Rfc),
    ("Superior Jerárquico:", ProfileField::Supervisor),
    ("Área de Adscripción:", ProfileField::Department),
    ("Puesto que desempeña:", ProfileField::Position),
    ("Nivel:", ProfileField::Level),
    ("Fecha del Nombramiento:", ProfileField::AppointmentDate),
    ("Antigüedad en el Puesto:", ProfileField::PositionSeniority),
    ("Antigüedad en Gobierno:", ProfileField::GovernmentSeniority),
];

/// Ordered columns the application reads and writes: profile columns first, evaluation columns after.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    columns: Vec<Column>,
}

impl ColumnSchema {
    pub fn canonical(rubric: &RubricConfig) -> Self {
        let mut columns: Vec<Column> = IDENTITY_COLUMNS
            .iter()
            .map(|(name, field)| Column {
                name: name.to_string(),
                kind: ColumnKind::Profile(*field),
            })
            .collect();

        for i in 0..FUNCTION_COUNT {
            columns.push(Column {
                name: format!("Principal Funcion {}", i + 1),
                kind: ColumnKind::Profile(ProfileField::Function(i)),
            });
        }
        for i in 0..rubric.goal_count {
            columns.push(Column {
                name: format!("Meta {} descripción", i + 1),
                kind: ColumnKind::Profile(ProfileField::GoalDescription(i)),
            });
            columns.push(Column {
                name: format!("Meta {} prog", i + 1),
                kind: ColumnKind::Profile(ProfileField::GoalProgrammed(i)),
            });
        }

        columns.push(Column {
            name: "Día".to_string(),
            kind: ColumnKind::Day,
        });
        columns.push(Column {
            name: "Mes".to_string(),
            kind: ColumnKind::Month,
        });
        columns.push(Column {
            name: "Año".to_string(),
            kind: ColumnKind::Year,
        });
        for i in 0..rubric.goal_count {
            columns.push(Column {
                name: format!("Meta {} real", i + 1),
                kind: ColumnKind::GoalActual(i),
            });
        }
        for i in 0..rubric.goal_count {
            columns.push(Column {
                name: format!("Resultado {}", i + 1),
                kind: ColumnKind::GoalResult(i),
            });
        }
        for (i, factor) in rubric.factors.iter().enumerate() {
            columns.push(Column {
                name: factor.clone(),
                kind: ColumnKind::Factor(i),
            });
        }
        columns.push(Column {
            name: "Puntaje total".to_string(),
            kind: ColumnKind::TotalScore,
        });
        columns.push(Column {
            name: "Comentarios".to_string(),
            kind: ColumnKind::Comments,
        });

        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Profile columns only, in canonical order.
    pub fn base_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind.is_base())
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn name_of(&self, kind: ColumnKind) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.name.as_str())
    }

    /// Canonical columns that do not sit at their canonical position in `header`.
    ///
    /// Rows are written positionally, so a header is compatible only when it starts
    /// with the canonical columns in order; extra trailing cells are allowed.
    pub fn mismatches_in(&self, header: &[String]) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(position, column)| match header.get(position) {
                Some(found) if found == &column.name => None,
                Some(found) => Some(format!(
                    "column {} expected '{}' found '{}'",
                    position + 1,
                    column.name,
                    found
                )),
                None => Some(format!("column {} '{}' absent", position + 1, column.name)),
            })
            .collect()
    }
}

/// Computes the header that replaces `remote`, or `None` when it already starts with
/// the canonical columns.
///
/// The remote header is padded to the canonical length and overwritten position by
/// position. Cells of a longer remote header past the canonical length survive.
pub fn reconcile_header(remote: &[String], canonical: &[String]) -> Option<Vec<String>> {
    if remote.starts_with(canonical) {
        return None;
    }
    let mut repaired = remote.to_vec();
    if repaired.len() < canonical.len() {
        repaired.resize(canonical.len(), String::new());
    }
    for (slot, name) in repaired.iter_mut().zip(canonical) {
        slot.clone_from(name);
    }
    Some(repaired)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepairPolicy {
    /// Rewrite row 1 with the canonical names.
    #[default]
    Repair,
    /// Leave the header untouched and fail unless it already starts with the canonical columns.
    Strict,
}

/// Header as it stands in the store after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSchema {
    pub header: Vec<String>,
    pub repaired: bool,
}

impl LiveSchema {
    pub fn width(&self) -> usize {
        self.header.len()
    }
}

pub struct SchemaRegistry {
    schema: ColumnSchema,
    policy: RepairPolicy,
}

impl SchemaRegistry {
    pub fn new(schema: ColumnSchema, policy: RepairPolicy) -> Self {
        Self { schema, policy }
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Brings the store header in line with the canonical schema and validates it.
    pub async fn ensure<S: SheetStore>(&self, store: &S) -> Result<LiveSchema, SchemaError> {
        let remote = store.read_header().await?;
        if remote.is_empty() {
            return Err(StoreError::EmptyStore {
                sheet: store.sheet_name().to_string(),
            }
            .into());
        }

        let canonical = self.schema.names();
        let live = match (self.policy, reconcile_header(&remote, &canonical)) {
            (_, None) => LiveSchema {
                header: remote,
                repaired: false,
            },
            (RepairPolicy::Strict, Some(_)) => LiveSchema {
                header: remote,
                repaired: false,
            },
            (RepairPolicy::Repair, Some(header)) => {
                store.write_header(&header).await?;
                info!(
                    sheet = store.sheet_name(),
                    previous_width = remote.len(),
                    width = header.len(),
                    "header repaired to canonical schema"
                );
                if let Err(err) = store.freeze_header().await {
                    warn!(sheet = store.sheet_name(), error = %err, "could not freeze header row");
                }
                LiveSchema {
                    header,
                    repaired: true,
                }
            }
        };

        let mismatched = self.schema.mismatches_in(&live.header);
        if !mismatched.is_empty() {
            return Err(SchemaError::Incompatible { mismatched });
        }
        Ok(live)
    }
}
