use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, anyhow};
use calamine::{Data, Reader, open_workbook_auto};

use crate::error::StartupError;
use crate::storage::extension_lower;

pub const COL_KATEGORI: &str = "Kategori";
pub const COL_PENYAKIT: &str = "Penyakit";
pub const COL_TINDAKAN: &str = "Tindakan Medis Utama";
pub const COL_ESTIMASI_MIN: &str = "Estimasi Min (Rp)";
pub const COL_ESTIMASI_MAX: &str = "Estimasi Max (Rp)";

pub const CATEGORICAL_COLUMNS: [&str; 3] = [COL_KATEGORI, COL_PENYAKIT, COL_TINDAKAN];
pub const REQUIRED_COLUMNS: [&str; 5] = [
    COL_KATEGORI,
    COL_PENYAKIT,
    COL_TINDAKAN,
    COL_ESTIMASI_MIN,
    COL_ESTIMASI_MAX,
];

/// One spreadsheet row: a disease, its category and main procedure, and the
/// Rupiah cost range.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub kategori: String,
    pub penyakit: String,
    pub tindakan: String,
    pub estimasi_min: f64,
    pub estimasi_max: f64,
}

impl CostRecord {
    /// Training target: midpoint of the estimate range.
    pub fn target(&self) -> f64 {
        (self.estimasi_min + self.estimasi_max) / 2.0
    }

    pub fn categorical(&self, column: &str) -> Option<&str> {
        match column {
            COL_KATEGORI => Some(&self.kategori),
            COL_PENYAKIT => Some(&self.penyakit),
            COL_TINDAKAN => Some(&self.tindakan),
            _ => None,
        }
    }
}

/// A raw cell before column typing is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// String form used for categorical columns. Whole numbers drop the
    /// fractional part so a category typed as `3` in Excel reads "3".
    pub fn as_category(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{n:.0}"),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CostTable {
    columns: Vec<String>,
    records: Vec<CostRecord>,
}

impl CostTable {
    /// Read a spreadsheet (first worksheet) or CSV file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let ext = extension_lower(path);
        let (header, rows) = match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path)?,
            "csv" => read_csv(path)?,
            _ => return Err(StartupError::UnsupportedFormat(ext).into()),
        };
        let table = Self::from_rows(header, rows)
            .with_context(|| format!("validate cost table {}", path.display()))?;
        Ok(table)
    }

    /// Builds the table from a header row and data rows. Column names are
    /// trimmed; extra columns are ignored; fully empty rows are skipped.
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, StartupError> {
        let columns: Vec<String> = header.iter().map(|c| c.trim().to_string()).collect();

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|req| !columns.iter().any(|c| c == *req))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(StartupError::MissingColumns {
                missing,
                present: columns,
            });
        }

        let idx = |name: &str| columns.iter().position(|c| c == name).unwrap_or(0);
        let (i_kat, i_pen, i_tin, i_min, i_max) = (
            idx(COL_KATEGORI),
            idx(COL_PENYAKIT),
            idx(COL_TINDAKAN),
            idx(COL_ESTIMASI_MIN),
            idx(COL_ESTIMASI_MAX),
        );

        let mut records = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.iter().all(|c| *c == Cell::Empty) {
                continue;
            }
            let cell = |j: usize| row.get(j).cloned().unwrap_or(Cell::Empty);
            // Row numbers in errors count the header as row 1.
            let number = |j: usize, column: &str| {
                let c = cell(j);
                c.as_number().ok_or_else(|| StartupError::BadNumber {
                    row: i + 2,
                    column: column.to_string(),
                    value: c.display(),
                })
            };

            records.push(CostRecord {
                kategori: cell(i_kat).as_category(),
                penyakit: cell(i_pen).as_category(),
                tindakan: cell(i_tin).as_category(),
                estimasi_min: number(i_min, COL_ESTIMASI_MIN)?,
                estimasi_max: number(i_max, COL_ESTIMASI_MAX)?,
            });
        }

        if records.is_empty() {
            return Err(StartupError::EmptyDataset);
        }

        Ok(Self { columns, records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// First row whose disease equals `penyakit` exactly (case-sensitive).
    pub fn find_disease(&self, penyakit: &str) -> Option<&CostRecord> {
        self.records.iter().find(|r| r.penyakit == penyakit)
    }

    /// Sorted distinct values of a categorical column.
    pub fn distinct(&self, column: &str) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| r.categorical(column))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn first(&self) -> &CostRecord {
        // from_rows rejects empty tables
        &self.records[0]
    }
}

fn read_workbook(path: &Path) -> anyhow::Result<(Vec<String>, Vec<Vec<Cell>>)> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("open workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook {} has no worksheets", path.display()))?
        .with_context(|| format!("read first worksheet of {}", path.display()))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let header = header_row
        .iter()
        .map(|c| workbook_cell(c).as_category())
        .collect();
    let data = rows
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect();
    Ok((header, data))
}

fn workbook_cell(c: &Data) -> Cell {
    match c {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        other => Cell::Text(other.to_string()),
    }
}

fn read_csv(path: &Path) -> anyhow::Result<(Vec<String>, Vec<Vec<Cell>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open csv {}", path.display()))?;

    let header = reader
        .headers()
        .context("read csv header")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read csv record {}", i + 2))?;
        rows.push(
            record
                .iter()
                .map(|f| {
                    if f.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(f.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok((header, rows))
}
