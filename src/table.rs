//! Minimal tabular model shared by every stage.
//!
//! Workbook files themselves are read and written by the caller; the pipeline
//! only needs to read a named sheet as columns of typed values and to hand a
//! set of named tables back. [`MemoryWorkbook`] implements both sides and is
//! what the tests use.

use crate::error::{FlashReportError, Result};
use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Number(n) => n.is_nan(),
            Self::Text(s) => s.trim().is_empty(),
            Self::Date(_) => false,
        }
    }

    /// Numeric view of the cell. Text is parsed after trimming and removing
    /// thousands separators; anything unparseable is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if !n.is_nan() => Some(*n),
            Self::Text(s) => {
                let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
                if cleaned.is_empty() {
                    None
                } else {
                    cleaned.parse::<f64>().ok().filter(|n| !n.is_nan())
                }
            }
            _ => None,
        }
    }

    /// Integer view; only integral numbers qualify.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64()
            .filter(|n| n.fract() == 0.0 && n.abs() < 9.0e15)
            .map(|n| n as i64)
    }

    /// Text view. Integral numbers render without a fractional part so ids
    /// read from numeric cells compare equal to their text form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Number(n) if n.is_nan() => None,
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                Some(format!("{}", *n as i64))
            }
            Self::Number(n) => Some(n.to_string()),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }

    /// Date view. Numbers are treated as spreadsheet serial dates.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Number(n) if *n >= 1.0 && n.fract() == 0.0 => {
                NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(*n as u64))
            }
            Self::Text(s) => parse_date_text(s.trim()),
            _ => None,
        }
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y", "%Y/%m/%d"];
    const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{text}"),
            None => Ok(()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Empty, Self::Number)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Empty, Self::Text)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// Column-named rows of cells. Rows shorter than the header read as empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        self.column_index(column).map(|idx| self.cell(row, idx))
    }

    /// Every cell of a column, in row order. Empty when the column is absent.
    pub fn column_values<'a>(&'a self, column: &str) -> Vec<&'a CellValue> {
        match self.column_index(column) {
            Some(idx) => (0..self.rows.len()).map(|r| self.cell(r, idx)).collect(),
            None => Vec::new(),
        }
    }

    /// Returns a copy with headers renamed through `renames` (source -> target).
    pub fn rename_columns(&self, renames: &BTreeMap<String, String>) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| renames.get(c).cloned().unwrap_or_else(|| c.clone()))
                .collect(),
            rows: self.rows.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub table: Table,
}

impl Sheet {
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}

/// Read access to multi-sheet workbooks, addressed by workbook and sheet name.
pub trait WorkbookSource {
    fn sheet_names(&self, workbook: &str) -> Result<Vec<String>>;

    fn read_sheet(&self, workbook: &str, sheet: &str) -> Result<Table>;

    fn read_sheet_at(&self, workbook: &str, index: usize) -> Result<Table> {
        let names = self.sheet_names(workbook)?;
        let name = names
            .get(index)
            .ok_or_else(|| FlashReportError::MissingSheet {
                workbook: workbook.to_string(),
                sheet: format!("#{index}"),
            })?;
        self.read_sheet(workbook, name)
    }

    fn read_first_sheet(&self, workbook: &str) -> Result<Table> {
        self.read_sheet_at(workbook, 0)
    }
}

/// Write access: a workbook is emitted as a whole, sheets in order.
pub trait WorkbookSink {
    fn write_workbook(&mut self, workbook: &str, sheets: Vec<Sheet>) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    workbooks: BTreeMap<String, Vec<Sheet>>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sheet(&mut self, workbook: &str, name: &str, table: Table) {
        let sheets = self.workbooks.entry(workbook.to_string()).or_default();
        match sheets.iter_mut().find(|s| s.name == name) {
            Some(existing) => existing.table = table,
            None => sheets.push(Sheet::new(name, table)),
        }
    }

    pub fn with_sheet(mut self, workbook: &str, name: &str, table: Table) -> Self {
        self.insert_sheet(workbook, name, table);
        self
    }

    pub fn workbook(&self, workbook: &str) -> Option<&[Sheet]> {
        self.workbooks.get(workbook).map(Vec::as_slice)
    }

    pub fn workbook_names(&self) -> impl Iterator<Item = &str> {
        self.workbooks.keys().map(String::as_str)
    }
}

impl WorkbookSource for MemoryWorkbook {
    fn sheet_names(&self, workbook: &str) -> Result<Vec<String>> {
        self.workbooks
            .get(workbook)
            .map(|sheets| sheets.iter().map(|s| s.name.clone()).collect())
            .ok_or_else(|| FlashReportError::MissingWorkbook(workbook.to_string()))
    }

    fn read_sheet(&self, workbook: &str, sheet: &str) -> Result<Table> {
        let sheets = self
            .workbooks
            .get(workbook)
            .ok_or_else(|| FlashReportError::MissingWorkbook(workbook.to_string()))?;
        sheets
            .iter()
            .find(|s| s.name == sheet)
            .map(|s| s.table.clone())
            .ok_or_else(|| FlashReportError::MissingSheet {
                workbook: workbook.to_string(),
                sheet: sheet.to_string(),
            })
    }
}

impl WorkbookSink for MemoryWorkbook {
    fn write_workbook(&mut self, workbook: &str, sheets: Vec<Sheet>) -> Result<()> {
        self.workbooks.insert(workbook.to_string(), sheets);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(CellValue::text(" 1,250.50 ").as_f64(), Some(1250.5));
        assert_eq!(CellValue::text("n/a").as_f64(), None);
        assert_eq!(CellValue::Number(2032.0).as_i64(), Some(2032));
        assert_eq!(CellValue::Number(2032.5).as_i64(), None);
        assert_eq!(CellValue::Empty.as_f64(), None);
    }

    #[test]
    fn test_integral_numbers_render_as_ids() {
        assert_eq!(
            CellValue::Number(1000939629.0).as_text().as_deref(),
            Some("1000939629")
        );
        assert_eq!(CellValue::text("  ").as_text(), None);
    }

    #[test]
    fn test_date_parsing() {
        let expected = NaiveDate::from_ymd_opt(2025, 8, 7).unwrap();
        assert_eq!(CellValue::text("2025-08-07").as_date(), Some(expected));
        assert_eq!(CellValue::text("08/07/2025").as_date(), Some(expected));
        assert_eq!(CellValue::text("2025-08-07 00:00:00").as_date(), Some(expected));
        // Spreadsheet serial for 2025-08-07
        assert_eq!(CellValue::Number(45876.0).as_date(), Some(expected));
    }

    #[test]
    fn test_memory_workbook_round_trip() {
        let mut table = Table::new(["A", "B"]);
        table.push_row(vec![1.0.into(), "x".into()]);

        let mut book = MemoryWorkbook::new().with_sheet("input", "Sheet1", table.clone());
        assert_eq!(book.read_sheet("input", "Sheet1").unwrap(), table);
        assert_eq!(book.read_first_sheet("input").unwrap(), table);
        assert!(matches!(
            book.read_sheet("input", "Other"),
            Err(FlashReportError::MissingSheet { .. })
        ));

        book.write_workbook("out", vec![Sheet::new("S", table)])
            .unwrap();
        assert_eq!(book.sheet_names("out").unwrap(), vec!["S".to_string()]);
    }

    #[test]
    fn test_short_rows_read_as_empty() {
        let mut table = Table::new(["A", "B"]);
        table.push_row(vec![1.0.into()]);
        assert_eq!(table.value(0, "B"), Some(&CellValue::Empty));
        assert_eq!(table.value(0, "C"), None);
    }
}
