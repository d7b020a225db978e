//! Spreadsheet loading.
//!
//! Reads xlsx/xls/xlsb/ods workbooks through calamine and plain CSV through
//! the csv crate. The first row is the header and must name every [`Column`].

use crate::error::{JudgeError, Result};
use calamine::{Data, Reader, open_workbook_auto};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A spreadsheet column the judge knows how to put into a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Column {
    Question,
    Content,
    Answer,
    ReferenceContent,
    ReferenceAnswer,
}

impl Column {
    /// All columns, in header order.
    pub const ALL: [Column; 5] = [
        Column::Question,
        Column::Content,
        Column::Answer,
        Column::ReferenceContent,
        Column::ReferenceAnswer,
    ];

    /// Header name as it appears in the spreadsheet.
    pub fn header(&self) -> &'static str {
        match self {
            Column::Question => "Question",
            Column::Content => "Content",
            Column::Answer => "Answer",
            Column::ReferenceContent => "Reference Content",
            Column::ReferenceAnswer => "Reference Answer",
        }
    }

    /// Lower-case term used to refer to this column in a grading prompt.
    pub fn term(&self) -> &'static str {
        match self {
            Column::Question => "question",
            Column::Content => "content",
            Column::Answer => "answer",
            Column::ReferenceContent => "reference content",
            Column::ReferenceAnswer => "reference answer",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl FromStr for Column {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Column::ALL
            .into_iter()
            .find(|c| c.header().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| JudgeError::UnknownColumn(wanted.to_string()))
    }
}

impl TryFrom<String> for Column {
    type Error = JudgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Column> for String {
    fn from(column: Column) -> Self {
        column.header().to_string()
    }
}

/// One data row of the spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Zero-based position among the data rows (header excluded).
    pub index: usize,
    pub cells: HashMap<Column, String>,
}

impl Row {
    /// Build a row from `(column, value)` pairs.
    pub fn new(index: usize, cells: impl IntoIterator<Item = (Column, String)>) -> Self {
        Self {
            index,
            cells: cells.into_iter().collect(),
        }
    }

    /// Cell text for a column, empty when the cell was blank.
    pub fn get(&self, column: Column) -> &str {
        self.cells.get(&column).map(String::as_str).unwrap_or("")
    }
}

/// A loaded spreadsheet.
#[derive(Debug, Clone)]
pub struct Sheet {
    /// Worksheet (or file) name.
    pub name: String,
    pub rows: Vec<Row>,
}

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    /// Any workbook calamine can open.
    Workbook,
    Csv,
}

impl SheetFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(SheetFormat::Workbook),
            "csv" => Ok(SheetFormat::Csv),
            _ => Err(JudgeError::UnsupportedFormat(ext)),
        }
    }
}

impl Sheet {
    /// Load a spreadsheet, using the named worksheet or the first one.
    pub fn load(path: &Path, sheet_name: Option<&str>) -> Result<Self> {
        if !path.exists() {
            return Err(JudgeError::SheetNotFound(path.to_path_buf()));
        }

        let (name, table) = match SheetFormat::from_path(path)? {
            SheetFormat::Workbook => read_workbook(path, sheet_name)?,
            SheetFormat::Csv => {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("sheet")
                    .to_string();
                (name, read_csv(path)?)
            }
        };

        Self::from_table(name, table)
    }

    /// Build a sheet from raw text rows, the first being the header.
    pub fn from_table(name: impl Into<String>, table: Vec<Vec<String>>) -> Result<Self> {
        let name = name.into();
        let mut table = table.into_iter();
        let header = table.next().unwrap_or_default();

        let positions: HashMap<Column, usize> = header
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.parse::<Column>().ok().map(|c| (c, i)))
            .collect();

        let missing: Vec<String> = Column::ALL
            .iter()
            .filter(|c| !positions.contains_key(c))
            .map(|c| c.header().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(JudgeError::MissingColumns(missing));
        }

        // Indices count blank rows too
        let rows: Vec<Row> = table
            .enumerate()
            .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
            .map(|(index, cells)| {
                let values = positions.iter().map(|(&column, &pos)| {
                    (column, cells.get(pos).cloned().unwrap_or_default())
                });
                Row::new(index, values)
            })
            .collect();

        if rows.is_empty() {
            return Err(JudgeError::EmptySheet(name));
        }

        tracing::debug!(sheet = %name, rows = rows.len(), "loaded spreadsheet");
        Ok(Self { name, rows })
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the sheet has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first `n` rows.
    pub fn preview(&self, n: usize) -> &[Row] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Keep only the first `n` rows.
    pub fn truncate(&mut self, n: usize) {
        self.rows.truncate(n);
    }
}

fn read_workbook(path: &Path, sheet_name: Option<&str>) -> Result<(String, Vec<Vec<String>>)> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| JudgeError::Spreadsheet(format!("failed to open workbook: {}", e)))?;

    let name = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| JudgeError::Spreadsheet("workbook contains no sheets".to_string()))?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| JudgeError::Spreadsheet(format!("failed to read sheet '{}': {}", name, e)))?;

    let table = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    Ok((name, table))
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut table = Vec::new();
    for record in reader.records() {
        let record = record?;
        table.push(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}

/// Render a workbook cell as prompt text.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) if dt.is_duration() => dt
            .as_duration()
            .map(|d| d.to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        // Whole serial numbers are plain dates
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(d) if dt.as_f64().fract() == 0.0 => d.date().to_string(),
            Some(d) => d.to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};
    use tempfile::TempDir;

    fn table(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    const HEADER: &[&str] = &[
        "Question",
        "Content",
        "Answer",
        "Reference Content",
        "Reference Answer",
    ];

    #[test]
    fn test_column_parsing() {
        assert_eq!("Question".parse::<Column>().unwrap(), Column::Question);
        assert_eq!(
            " reference answer ".parse::<Column>().unwrap(),
            Column::ReferenceAnswer
        );
        assert!("Context".parse::<Column>().is_err());
    }

    #[test]
    fn test_from_table_maps_columns_by_header() {
        let sheet = Sheet::from_table(
            "qa",
            table(&[
                &["Answer", "Question", "Reference Answer", "Content", "Reference Content", "Notes"],
                &["Paris", "Capital of France?", "Paris", "France...", "Paris is...", "ignored"],
            ]),
        )
        .unwrap();

        assert_eq!(sheet.len(), 1);
        let row = &sheet.rows[0];
        assert_eq!(row.index, 0);
        assert_eq!(row.get(Column::Question), "Capital of France?");
        assert_eq!(row.get(Column::Answer), "Paris");
        assert_eq!(row.get(Column::ReferenceContent), "Paris is...");
    }

    #[test]
    fn test_missing_columns_are_listed() {
        let err = Sheet::from_table("qa", table(&[&["Question", "Answer"], &["q", "a"]]))
            .unwrap_err();
        match err {
            JudgeError::MissingColumns(cols) => {
                assert_eq!(cols, vec!["Content", "Reference Content", "Reference Answer"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let sheet = Sheet::from_table(
            "qa",
            table(&[HEADER, &["", "", "", "", ""], &["q", "c", "a", "rc", "ra"], &["q2"]]),
        )
        .unwrap();

        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.rows[0].get(Column::Question), "q");
        assert_eq!(sheet.rows[0].index, 1);
        assert_eq!(sheet.rows[1].index, 2);
        assert_eq!(sheet.rows[1].get(Column::Answer), "");
    }

    #[test]
    fn test_header_only_is_empty_sheet() {
        let err = Sheet::from_table("qa", table(&[HEADER])).unwrap_err();
        assert!(matches!(err, JudgeError::EmptySheet(_)));
    }

    #[test]
    fn test_load_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("questions.csv");
        std::fs::write(
            &path,
            "Question,Content,Answer,Reference Content,Reference Answer\n\
             \"What is 2+2?\",\"Arithmetic, basics\",4,Math,4\n",
        )
        .unwrap();

        let sheet = Sheet::load(&path, None).unwrap();
        assert_eq!(sheet.name, "questions");
        assert_eq!(sheet.rows[0].get(Column::Content), "Arithmetic, basics");
        assert_eq!(sheet.preview(10).len(), 1);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("questions.txt");
        std::fs::write(&path, "nothing").unwrap();
        assert!(matches!(
            Sheet::load(&path, None),
            Err(JudgeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_load_nonexistent() {
        assert!(matches!(
            Sheet::load(Path::new("/nonexistent/questions.xlsx"), None),
            Err(JudgeError::SheetNotFound(_))
        ));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(4.0)), "4");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn test_cell_text_dates() {
        let date = ExcelDateTime::new(45306.0, ExcelDateTimeType::DateTime, false);
        assert_eq!(cell_text(&Data::DateTime(date)), "2024-01-15");

        let noon = ExcelDateTime::new(45306.5, ExcelDateTimeType::DateTime, false);
        assert_eq!(cell_text(&Data::DateTime(noon)), "2024-01-15 12:00:00");

        assert_eq!(
            cell_text(&Data::DateTimeIso("2024-01-15T09:30:00".to_string())),
            "2024-01-15T09:30:00"
        );
        assert_eq!(cell_text(&Data::DurationIso("PT1H".to_string())), "PT1H");
    }

    #[test]
    fn test_truncate_to_nothing() {
        let mut sheet = Sheet::from_table("qa", table(&[HEADER, &["q"]])).unwrap();
        assert!(!sheet.is_empty());
        sheet.truncate(0);
        assert!(sheet.is_empty());
    }

    fn write_workbook(path: &Path) -> std::result::Result<(), rust_xlsxwriter::XlsxError> {
        use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let mut workbook = Workbook::new();

        let qa = workbook.add_worksheet().set_name("QA")?;
        for (col, header) in HEADER.iter().enumerate() {
            qa.write_string(0, col as u16, *header)?;
        }
        qa.write_string(1, 0, "When was the release?")?;
        qa.write_datetime_with_format(1, 1, &ExcelDateTime::from_ymd(2024, 1, 15)?, &date_format)?;
        qa.write_number(1, 2, 4.0)?;
        qa.write_string(1, 3, "Release notes")?;
        qa.write_number(1, 4, 2.5)?;

        let archive = workbook.add_worksheet().set_name("Archive")?;
        for (col, header) in HEADER.iter().enumerate() {
            archive.write_string(0, col as u16, *header)?;
        }
        archive.write_string(1, 0, "Old question")?;
        archive.write_string(2, 0, "Older question")?;

        workbook.save(path)
    }

    #[test]
    fn test_load_xlsx() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("questions.xlsx");
        write_workbook(&path).unwrap();

        let sheet = Sheet::load(&path, None).unwrap();
        assert_eq!(sheet.name, "QA");
        assert_eq!(sheet.len(), 1);
        let row = &sheet.rows[0];
        assert_eq!(row.get(Column::Question), "When was the release?");
        assert_eq!(row.get(Column::Content), "2024-01-15");
        assert_eq!(row.get(Column::Answer), "4");
        assert_eq!(row.get(Column::ReferenceAnswer), "2.5");

        let archive = Sheet::load(&path, Some("Archive")).unwrap();
        assert_eq!(archive.name, "Archive");
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.rows[1].get(Column::Question), "Older question");

        assert!(matches!(
            Sheet::load(&path, Some("Missing")),
            Err(JudgeError::Spreadsheet(_))
        ));
    }
}
