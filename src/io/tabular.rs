//! Parsing of uploaded CSV and XLSX files into consumption records.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};

use crate::domain::{ConsumptionRecord, new_id};

/// Columns every upload must carry, by header name.
pub const REQUIRED_COLUMNS: [&str; 3] = ["region", "timestamp", "value"];

/// Cell texts read as a missing value rather than a parse failure.
const MISSING_MARKERS: [&str; 17] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>", "N/A", "NA",
    "NULL", "None", "n/a", "null",
];

/// Upload formats the service accepts, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
}

impl FileFormat {
    /// Picks the format from the file name suffix; anything else is rejected.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".csv") {
            Some(Self::Csv)
        } else if name.ends_with(".xlsx") {
            Some(Self::Xlsx)
        } else {
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TabularError {
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Xlsx(#[from] calamine::XlsxError),
    #[error("workbook has no worksheets")]
    NoWorksheet,
    #[error("No columns to parse from file")]
    NoColumns,
    #[error("row {row}: could not convert {value:?} in column `value` to a number")]
    NotNumeric { row: usize, value: String },
    #[error("Missing required columns. Found: {found:?}, Required: {required:?}")]
    MissingColumns {
        found: Vec<String>,
        required: Vec<&'static str>,
    },
}

/// Header row plus data rows, every cell rendered as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Positions of the required columns within a sheet.
#[derive(Debug, Clone, Copy)]
struct Columns {
    region: usize,
    timestamp: usize,
    value: usize,
}

impl Sheet {
    /// Parses the whole payload in the given format.
    ///
    /// # Errors
    ///
    /// Returns a `TabularError` when the payload is not valid for its format.
    pub fn parse(format: FileFormat, bytes: &[u8]) -> Result<Self, TabularError> {
        match format {
            FileFormat::Csv => Self::from_csv(bytes),
            FileFormat::Xlsx => Self::from_xlsx(bytes),
        }
    }

    pub fn from_csv(bytes: &[u8]) -> Result<Self, TabularError> {
        let mut rdr = csv::ReaderBuilder::new().from_reader(bytes);
        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(TabularError::NoColumns);
        }

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Reads the first worksheet; its first row is the header.
    pub fn from_xlsx(bytes: &[u8]) -> Result<Self, TabularError> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(TabularError::NoWorksheet)??;

        let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
        let headers = rows.next().unwrap_or_default();
        Ok(Self {
            headers,
            rows: rows.collect(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// `(data rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.headers.len())
    }

    fn columns(&self) -> Result<Columns, TabularError> {
        let find = |name: &str| self.headers.iter().position(|h| h == name);
        match (find("region"), find("timestamp"), find("value")) {
            (Some(region), Some(timestamp), Some(value)) => Ok(Columns {
                region,
                timestamp,
                value,
            }),
            _ => Err(TabularError::MissingColumns {
                found: self.headers.clone(),
                required: REQUIRED_COLUMNS.to_vec(),
            }),
        }
    }

    /// Converts rows to records tagged with `file_id`, lazily and in order.
    ///
    /// Each row gets a fresh id. A blank or NA-style `value` becomes NaN. A
    /// row whose `value` is other non-numeric text yields an error at its
    /// position; rows before it are unaffected.
    ///
    /// # Errors
    ///
    /// `TabularError::MissingColumns` if the required columns are absent.
    pub fn consumption_records<'a>(
        &'a self,
        file_id: &'a str,
    ) -> Result<impl Iterator<Item = Result<ConsumptionRecord, TabularError>> + 'a, TabularError> {
        let cols = self.columns()?;
        Ok(self.rows.iter().enumerate().map(move |(i, row)| -> Result<ConsumptionRecord, TabularError> {
            let cell = |idx: usize| row.get(idx).map(String::as_str).unwrap_or("");
            let raw = cell(cols.value);
            let value = parse_value(raw).ok_or_else(|| TabularError::NotNumeric {
                row: i,
                value: raw.to_string(),
            })?;
            Ok(ConsumptionRecord {
                id: new_id(),
                region: cell(cols.region).to_string(),
                timestamp: cell(cols.timestamp).to_string(),
                value,
                file_id: file_id.to_string(),
            })
        }))
    }
}

/// Numeric cell value; missing markers map to NaN.
fn parse_value(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if MISSING_MARKERS.contains(&text) {
        return Some(f64::NAN);
    }
    text.parse().ok()
}

/// Renders a worksheet cell as the text a CSV export of it would hold.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::Error(e) => e.to_string(),
    }
}
