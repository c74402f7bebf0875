//! Delimited text ingestion into per-column datasets.
//!
//! The expected layout is a comma-separated file with a header line. The first
//! field of every line is a label (typically a timestamp) and is discarded; the
//! remaining fields are numeric and become one [`Decimal`] column each, named
//! by the header.
//!
//! ```text
//! time,x,y,z
//! 2024-01-01 00:00:00,0.12,-0.50,9.81
//! 2024-01-01 00:00:01,0.10,-0.48,9.79
//! ```
//!
//! Data lines are parsed concurrently on the `rayon` pool.

use core::fmt;
use core::num::ParseFloatError;
use std::path::Path;

use rayon::prelude::*;

use crate::Decimal;

/// Failure to read or parse a data file.
#[derive(Debug)]
pub enum LoadError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The input has no header line, or the header names no columns.
    MissingHeader,
    /// A data line has the wrong number of fields.
    Ragged {
        /// 1-based line number.
        line: usize,
        /// Numeric fields the header announced.
        expected: usize,
        /// Numeric fields found on the line.
        found: usize,
    },
    /// A field is not a number.
    Parse {
        /// 1-based line number.
        line: usize,
        /// Name of the column the field belongs to.
        column: String,
        /// The parse failure.
        source: ParseFloatError,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::MissingHeader => write!(f, "missing header line"),
            Self::Ragged { line, expected, found } => {
                write!(f, "line {line}: expected {expected} values, found {found}")
            }
            Self::Parse { line, column, source } => {
                write!(f, "line {line}: column `{column}`: {source}")
            }
        }
    }
}

impl core::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Named numeric columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<Decimal>>,
}

impl Table {
    /// Column names, in file order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of data rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// The column called `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Decimal]> {
        let index = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[index])
    }

    /// The column called `name`, mutably (statistics sort their input).
    #[must_use]
    pub fn column_mut(&mut self, name: &str) -> Option<&mut [Decimal]> {
        let index = self.names.iter().position(|n| n == name)?;
        Some(&mut self.columns[index])
    }

    /// Every `(name, column)` pair, in file order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Decimal])> {
        self.names.iter().map(String::as_str).zip(self.columns.iter().map(Vec::as_slice))
    }

    /// Every `(name, column)` pair, mutably.
    pub fn columns_mut(&mut self) -> impl Iterator<Item = (&str, &mut [Decimal])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter_mut().map(Vec::as_mut_slice))
    }
}

/// Reads and parses the file at `path`; see [`parse_csv`].
///
/// # Errors
///
/// [`LoadError::Io`] when the file cannot be read, otherwise as [`parse_csv`].
pub fn load_csv(path: impl AsRef<Path>) -> Result<Table, LoadError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    log::debug!("loaded {} bytes from {}", text.len(), path.display());
    parse_csv(&text)
}

/// Parses labelled comma-separated text into a [`Table`].
///
/// Blank lines are skipped and `\r\n` line endings are accepted. Fields are
/// trimmed before parsing.
///
/// # Errors
///
/// - [`LoadError::MissingHeader`] when there is no header naming a column
/// - [`LoadError::Ragged`] / [`LoadError::Parse`] for the first bad data line
///
/// # Example
///
/// ```
/// use mad_cv::loader::parse_csv;
///
/// let table = parse_csv("t,x,y\nmon,1.5,2\ntue,2.5,4\n").unwrap();
/// assert_eq!(table.column("x"), Some(&[1.5, 2.5][..]));
/// assert_eq!(table.rows(), 2);
/// ```
pub fn parse_csv(text: &str) -> Result<Table, LoadError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or(LoadError::MissingHeader)?;
    let names: Vec<String> = header.split(',').skip(1).map(|s| s.trim().to_owned()).collect();
    if names.is_empty() {
        return Err(LoadError::MissingHeader);
    }

    let data: Vec<(usize, &str)> = lines.collect();
    let rows: Vec<Result<Vec<Decimal>, LoadError>> = data
        .par_iter()
        .map(|&(index, line)| parse_row(index + 1, line, &names))
        .collect();

    let mut columns = vec![Vec::with_capacity(rows.len()); names.len()];
    for row in rows {
        for (column, value) in columns.iter_mut().zip(row?) {
            column.push(value);
        }
    }

    log::debug!("parsed {} rows of {} columns", data.len(), names.len());
    Ok(Table { names, columns })
}

fn parse_row(line: usize, text: &str, names: &[String]) -> Result<Vec<Decimal>, LoadError> {
    let fields: Vec<&str> = text.split(',').skip(1).collect();
    if fields.len() != names.len() {
        return Err(LoadError::Ragged { line, expected: names.len(), found: fields.len() });
    }

    fields
        .iter()
        .zip(names)
        .map(|(field, column)| {
            field.trim().parse::<Decimal>().map_err(|source| LoadError::Parse {
                line,
                column: column.clone(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "datetime,x,y,z\r\n\
        2024-01-01 00:00:00,38,1.0,-2\r\n\
        2024-01-01 00:00:01,27,2.0,-2\r\n\
        \r\n\
        2024-01-01 00:00:02,43,3.0,-2\r\n";

    #[test]
    fn parses_columns_by_header() {
        let table = parse_csv(SAMPLE).unwrap();
        assert_eq!(table.names(), ["x", "y", "z"]);
        assert_eq!(table.rows(), 3);
        assert_eq!(table.column("x"), Some(&[38.0, 27.0, 43.0][..]));
        assert_eq!(table.column("z"), Some(&[-2.0, -2.0, -2.0][..]));
        assert_eq!(table.column("w"), None);
    }

    #[test]
    fn columns_iterate_in_file_order() {
        let table = parse_csv(SAMPLE).unwrap();
        let names: Vec<&str> = table.columns().map(|(n, _)| n).collect();
        assert_eq!(names, ["x", "y", "z"]);
    }

    #[test]
    fn columns_can_be_sorted_in_place() {
        use crate::ops::dispatch::ScalarBackend;
        use crate::stats::compute_mad;

        let mut table = parse_csv(SAMPLE).unwrap();
        let mads: Vec<(String, Decimal)> = table
            .columns_mut()
            .map(|(name, column)| (name.to_owned(), compute_mad(&mut ScalarBackend::default(), column).unwrap()))
            .collect();

        assert_eq!(mads[0], ("x".to_owned(), 5.0));
        assert_eq!(mads[2], ("z".to_owned(), 0.0));
        assert_eq!(table.column("x"), Some(&[27.0, 38.0, 43.0][..]));
    }

    #[test]
    fn ragged_line_reports_line_number() {
        let err = parse_csv("t,a,b\n0,1,2\n1,3\n").unwrap_err();
        assert!(matches!(err, LoadError::Ragged { line: 3, expected: 2, found: 1 }));
    }

    #[test]
    fn bad_number_reports_column() {
        let err = parse_csv("t,a,b\n0,1,2\n1,3,four\n").unwrap_err();
        match err {
            LoadError::Parse { line, column, .. } => assert_eq!((line, column.as_str()), (3, "b")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn header_only_and_empty_inputs() {
        assert!(matches!(parse_csv(""), Err(LoadError::MissingHeader)));
        assert!(matches!(parse_csv("label\n1\n"), Err(LoadError::MissingHeader)));
        assert_eq!(parse_csv("t,a\n").unwrap().rows(), 0);
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(load_csv("/nonexistent/data.csv"), Err(LoadError::Io(_))));
    }
}
