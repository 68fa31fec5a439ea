//! Semicolon-separated exports for spreadsheet analysis
//!
//! Two tables are written:
//!
//! - the session table, one row per event:
//!   `time;duration;path;line;function;name`
//! - the statistics table, one row per location:
//!   `name;function;file;line;mean duration;standard deviation;mean frequency;hits`
//!
//! Both go through the `csv` crate with `;` as delimiter, so fields holding
//! the separator, a quote or a line break are quoted with embedded quotes
//! doubled. Unavailable frequencies are written as `NaN`.

use crate::aggregate::{LocationOrder, SessionStats};
use crate::loader::SessionRow;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::Write;
use thiserror::Error;

pub const SEPARATOR: u8 = b';';

pub const SESSION_HEADER: &str = "time;duration;path;line;function;name";

pub const STATS_HEADER: &str =
    "name;function;file;line;mean duration;standard deviation;mean frequency;hits";

/// Errors raised while reading a session export back
#[derive(Error, Debug)]
pub enum CsvError {
    #[error("Missing or unexpected header, expected `time;duration;path;line;function;name`")]
    Header,

    #[error("Malformed session export: {0}")]
    Malformed(#[from] csv::Error),
}

/// One line of the session table; field names are the header columns
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord<'a> {
    time: f64,
    duration: f64,
    path: Cow<'a, str>,
    line: u32,
    function: Cow<'a, str>,
    name: Cow<'a, str>,
}

impl<'a> From<&'a SessionRow> for SessionRecord<'a> {
    fn from(row: &'a SessionRow) -> Self {
        Self {
            time: row.time,
            duration: row.duration,
            path: Cow::Borrowed(&row.path),
            line: row.line,
            function: Cow::Borrowed(&row.function),
            name: Cow::Borrowed(&row.label),
        }
    }
}

impl From<SessionRecord<'_>> for SessionRow {
    fn from(record: SessionRecord<'_>) -> Self {
        Self {
            time: record.time,
            duration: record.duration,
            path: record.path.into_owned(),
            line: record.line,
            function: record.function.into_owned(),
            label: record.name.into_owned(),
        }
    }
}

/// One line of the statistics table
#[derive(Debug, Serialize)]
struct StatsRecord<'a> {
    name: &'a str,
    function: &'a str,
    file: &'a str,
    line: u32,
    mean_duration: f64,
    std_deviation: f64,
    mean_frequency: f64,
    hits: usize,
}

/// Headers are written explicitly so an empty table still has one
fn csv_writer<W: Write>(writer: W, header: &str) -> csv::Result<csv::Writer<W>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(SEPARATOR)
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(header.split(char::from(SEPARATOR)))?;
    Ok(writer)
}

/// Write every event of a session, with header
pub fn write_session_csv<W: Write>(rows: &[SessionRow], writer: &mut W) -> csv::Result<()> {
    let mut writer = csv_writer(writer, SESSION_HEADER)?;
    for row in rows {
        writer.serialize(SessionRecord::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Session table as a string
pub fn session_to_csv(rows: &[SessionRow]) -> csv::Result<String> {
    let mut buf = Vec::new();
    write_session_csv(rows, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write one row per location of `stats`, listed in `order`
pub fn write_stats_csv<W: Write>(
    stats: &SessionStats,
    order: LocationOrder,
    writer: &mut W,
) -> csv::Result<()> {
    let mut writer = csv_writer(writer, STATS_HEADER)?;
    for element in stats.iter(order) {
        writer.serialize(StatsRecord {
            name: &element.label,
            function: &element.function,
            file: &element.path,
            line: element.line,
            mean_duration: element.mean_duration,
            std_deviation: element.std_deviation,
            mean_frequency: element.mean_frequency.unwrap_or(f64::NAN),
            hits: element.hits(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Statistics table as a string
pub fn stats_to_csv(stats: &SessionStats, order: LocationOrder) -> csv::Result<String> {
    let mut buf = Vec::new();
    write_stats_csv(stats, order, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read a session export back into rows
///
/// The header must match [`SESSION_HEADER`]; any malformed record fails the
/// parse.
pub fn parse_session_csv(content: &str) -> Result<Vec<SessionRow>, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(SEPARATOR)
        .from_reader(content.as_bytes());

    let header = reader.headers()?;
    if !header.iter().eq(SESSION_HEADER.split(char::from(SEPARATOR))) {
        return Err(CsvError::Header);
    }

    reader
        .deserialize::<SessionRecord<'static>>()
        .map(|record| record.map(SessionRow::from).map_err(CsvError::from))
        .collect()
}
