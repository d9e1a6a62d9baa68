//! Upload parsing for CSV and XLSX files.
//!
//! Produces an immutable [`ParsedFile`]: headers plus 1-based [`ParsedRow`]s.
//! Both formats share the header option and the size and row ceilings, the
//! row ceiling by aborting the read as soon as it is exceeded.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};

use crate::types::RowNumber;

// ── Constants ────────────────────────────────────────────────────────

/// Candidate delimiters, in tie-break order.
pub const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Number of leading lines inspected for delimiter detection.
pub const DELIMITER_SAMPLE_LINES: usize = 5;

/// Default maximum upload size (10 MiB).
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Default maximum number of data rows.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

// ── Types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Csv,
    Xlsx,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }

    /// Derive the file type from a file name's extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = file_name.rsplit_once('.')?.1.to_lowercase();
        match ext.as_str() {
            "csv" | "txt" | "tsv" => Some(Self::Csv),
            "xlsx" | "xlsm" => Some(Self::Xlsx),
            _ => None,
        }
    }
}

/// One data row of the uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRow {
    /// 1-based, header excluded.
    pub row_number: RowNumber,
    pub values: Vec<String>,
}

impl ParsedRow {
    /// Raw value at `index`, or `""` past the end of a short row.
    pub fn value(&self, index: usize) -> &str {
        self.values.get(index).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub file_name: String,
    pub file_type: FileType,
    /// Detected CSV delimiter; `None` for spreadsheets.
    pub delimiter: Option<char>,
    pub has_header: bool,
    pub headers: Vec<String>,
    pub rows: Vec<ParsedRow>,
}

impl ParsedFile {
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// When `false`, synthetic `A, B, C…` headers are generated.
    pub has_header: bool,
    pub max_file_bytes: usize,
    pub max_rows: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("File is empty")]
    Empty,

    #[error("File is too large: {size} bytes (maximum {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("File has more than {max} rows")]
    TooManyRows { max: usize },

    #[error("Malformed CSV at line {line}: {message}")]
    Malformed { line: u64, message: String },

    #[error("Unreadable spreadsheet: {0}")]
    Spreadsheet(String),
}

// ── Parsing ──────────────────────────────────────────────────────────

/// Parse an uploaded file, dispatching on its extension.
pub fn parse_upload(file_name: &str, bytes: &[u8], options: &ParseOptions) -> Result<ParsedFile, ParseError> {
    let file_type = FileType::from_file_name(file_name)
        .ok_or_else(|| ParseError::UnsupportedFileType(file_name.to_string()))?;

    if bytes.len() > options.max_file_bytes {
        return Err(ParseError::FileTooLarge {
            size: bytes.len(),
            max: options.max_file_bytes,
        });
    }

    let mut table = TableBuilder::new(options);
    let delimiter = match file_type {
        FileType::Csv => Some(read_csv(bytes, &mut table)? as char),
        FileType::Xlsx => {
            read_xlsx(bytes, &mut table)?;
            None
        }
    };

    if table.is_empty() {
        return Err(ParseError::Empty);
    }
    let (headers, rows) = table.finish();

    Ok(ParsedFile {
        file_name: file_name.to_string(),
        file_type,
        delimiter,
        has_header: options.has_header,
        headers,
        rows,
    })
}

/// Feed every CSV record to `table` and return the detected delimiter.
fn read_csv(bytes: &[u8], table: &mut TableBuilder<'_>) -> Result<u8, ParseError> {
    let content = decode(bytes);
    if content.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let delimiter = detect_delimiter(&content);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(Trim::None)
        .from_reader(content.as_bytes());

    for result in reader.records() {
        let record = result.map_err(|e| ParseError::Malformed {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            message: e.to_string(),
        })?;
        table.push(record.iter().map(str::to_string).collect())?;
    }
    Ok(delimiter)
}

/// Feed every row of the workbook's first sheet to `table`.
fn read_xlsx(bytes: &[u8], table: &mut TableBuilder<'_>) -> Result<(), ParseError> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).map_err(|e| ParseError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::Empty)?
        .map_err(|e| ParseError::Spreadsheet(e.to_string()))?;

    for row in range.rows() {
        table.push(row.iter().map(cell_text).collect())?;
    }
    Ok(())
}

/// Text of a spreadsheet cell as a user would type it. Whole numbers lose
/// their `.0`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// Collects header and data rows from either format.
struct TableBuilder<'o> {
    options: &'o ParseOptions,
    headers: Option<Vec<String>>,
    rows: Vec<ParsedRow>,
    widest: usize,
}

impl<'o> TableBuilder<'o> {
    fn new(options: &'o ParseOptions) -> Self {
        Self {
            options,
            headers: None,
            rows: Vec::new(),
            widest: 0,
        }
    }

    /// Blank lines are skipped. Fails as soon as the row ceiling is exceeded.
    fn push(&mut self, values: Vec<String>) -> Result<(), ParseError> {
        if values.iter().all(|v| v.trim().is_empty()) {
            return Ok(());
        }

        if self.options.has_header && self.headers.is_none() {
            self.headers = Some(values.iter().map(|h| h.trim().to_string()).collect());
            return Ok(());
        }

        if self.rows.len() >= self.options.max_rows {
            return Err(ParseError::TooManyRows {
                max: self.options.max_rows,
            });
        }

        self.widest = self.widest.max(values.len());
        self.rows.push(ParsedRow {
            row_number: self.rows.len() as RowNumber + 1,
            values,
        });
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.headers.is_none() && self.rows.is_empty()
    }

    fn finish(self) -> (Vec<String>, Vec<ParsedRow>) {
        let headers = match self.headers {
            Some(h) => fill_blank_headers(h),
            None => (0..self.widest).map(synthetic_column_name).collect(),
        };
        (headers, self.rows)
    }
}

/// Pick the candidate delimiter that occurs most often in the first lines.
/// Ties go to the earlier candidate; no occurrences at all falls back to `,`.
pub fn detect_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content.lines().take(DELIMITER_SAMPLE_LINES).collect();

    let mut best = DELIMITER_CANDIDATES[0];
    let mut best_count = 0usize;
    for candidate in DELIMITER_CANDIDATES {
        let count: usize = sample
            .iter()
            .map(|line| line.bytes().filter(|b| *b == candidate).count())
            .sum();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Spreadsheet-style column name for a 0-based index: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn synthetic_column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

// ── Private helpers ──────────────────────────────────────────────────

/// UTF-8 with optional BOM; invalid sequences are replaced.
fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Blank header cells get their synthetic column name so every column stays addressable.
fn fill_blank_headers(headers: Vec<String>) -> Vec<String> {
    headers
        .into_iter()
        .enumerate()
        .map(|(i, h)| if h.is_empty() { synthetic_column_name(i) } else { h })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────
