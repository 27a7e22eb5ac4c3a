use std::path::Path;

use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::error::StoreError;
use crate::store::SheetStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const REGISTER_SHEET: &str =
    "INSERT INTO evaluation_sheet.sheets (name) VALUES ($1) ON CONFLICT (name) DO NOTHING";

/// A named sheet kept in Postgres. Row 1 is the flagged header row; data rows follow
/// in insertion order.
#[derive(Clone)]
pub struct PgSheetStore {
    pool: PgPool,
    sheet: String,
}

impl PgSheetStore {
    pub fn new(pool: PgPool, sheet: impl Into<String>) -> Self {
        Self {
            pool,
            sheet: sheet.into(),
        }
    }

    /// Drops every row of the sheet and writes `header` plus `rows` in their place.
    pub async fn replace_sheet(&self, header: &[String], rows: &[Vec<String>]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(REGISTER_SHEET)
            .bind(&self.sheet)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM evaluation_sheet.sheet_rows WHERE sheet = $1")
            .bind(&self.sheet)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO evaluation_sheet.sheet_rows (sheet, is_header, cells) VALUES ($1, TRUE, $2)",
        )
        .bind(&self.sheet)
        .bind(header)
        .execute(&mut *tx)
        .await?;

        if !rows.is_empty() {
            insert_rows(&self.sheet, rows).build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn insert_rows<'a>(sheet: &'a str, rows: &'a [Vec<String>]) -> QueryBuilder<'a, Postgres> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO evaluation_sheet.sheet_rows (sheet, is_header, cells) ");
    builder.push_values(rows, |mut values, row| {
        values.push_bind(sheet).push_bind(false).push_bind(row);
    });
    builder
}

impl SheetStore for PgSheetStore {
    fn sheet_name(&self) -> &str {
        &self.sheet
    }

    async fn read_header(&self) -> Result<Vec<String>, StoreError> {
        let header: Option<Vec<String>> = sqlx::query_scalar(
            "SELECT cells FROM evaluation_sheet.sheet_rows WHERE sheet = $1 AND is_header",
        )
        .bind(&self.sheet)
        .fetch_optional(&self.pool)
        .await?;
        Ok(header.unwrap_or_default())
    }

    async fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let records = sqlx::query(
            "SELECT cells FROM evaluation_sheet.sheet_rows \
             WHERE sheet = $1 \
             ORDER BY is_header DESC, id",
        )
        .bind(&self.sheet)
        .fetch_all(&self.pool)
        .await?;

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            rows.push(record.try_get::<Vec<String>, _>("cells")?);
        }
        Ok(rows)
    }

    async fn write_header(&self, header: &[String]) -> Result<(), StoreError> {
        sqlx::query(REGISTER_SHEET)
            .bind(&self.sheet)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO evaluation_sheet.sheet_rows (sheet, is_header, cells)
            VALUES ($1, TRUE, $2)
            ON CONFLICT (sheet) WHERE is_header DO UPDATE
            SET cells = EXCLUDED.cells
            "#,
        )
        .bind(&self.sheet)
        .bind(header)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn freeze_header(&self) -> Result<(), StoreError> {
        sqlx::query("UPDATE evaluation_sheet.sheets SET frozen_rows = 1 WHERE name = $1")
            .bind(&self.sheet)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        insert_rows(&self.sheet, rows)
            .build()
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Writes a demo sheet whose header only carries the profile columns, so the first
/// `ensure-schema` has drift to repair.
pub async fn seed(store: &PgSheetStore, base_header: &[String]) -> anyhow::Result<usize> {
    let people = [
        (
            "Avery Lee Morales",
            "LEMA850312HDFRRV04",
            "LEMA850312AB1",
            "Jules Moreno",
            "Finanzas",
            "Analista",
            "27",
            "2019-04-01",
            "6 años",
            "9 años",
        ),
        (
            "Jules Moreno Díaz",
            "MODJ790102HDFRZL08",
            "MODJ790102QX3",
            "Kiara Patel",
            "Finanzas",
            "Jefe de Departamento",
            "29",
            "2015-09-16",
            "10 años",
            "14 años",
        ),
        (
            "Kiara Patel Ruiz",
            "PARK900725MDFTZR02",
            "PARK900725TT9",
            "Dirección General",
            "Recursos Humanos",
            "Coordinadora",
            "31",
            "2021-01-11",
            "4 años",
            "5 años",
        ),
    ];

    let mut rows = Vec::new();
    for (name, curp, rfc, supervisor, area, position, level, appointed, in_position, in_government) in
        people
    {
        let mut row: Vec<String> = [
            name,
            curp,
            rfc,
            supervisor,
            area,
            position,
            level,
            appointed,
            in_position,
            in_government,
            "Atención a usuarios",
            "Elaboración de informes",
            "Seguimiento presupuestal",
        ]
        .iter()
        .map(|cell| cell.to_string())
        .collect();
        for (description, programmed) in [
            ("Informes mensuales", "12"),
            ("Expedientes revisados", "200"),
            ("Capacitaciones impartidas", "4"),
            ("Auditorías internas", ""),
        ] {
            row.push(description.to_string());
            row.push(programmed.to_string());
        }
        row.resize(base_header.len(), String::new());
        rows.push(row);
    }

    store.replace_sheet(base_header, &rows).await?;
    Ok(rows.len())
}

/// Replaces the sheet with the contents of a CSV file; its first line becomes the header.
pub async fn import_csv(store: &PgSheetStore, csv_path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(csv_path)?;
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<String>>());
    }

    store.replace_sheet(&header, &rows).await?;
    Ok(rows.len())
}
