//! Session loading
//!
//! Reads the two artifacts a [`ProfilingSession`](crate::recorder::ProfilingSession)
//! leaves in its output directory back into memory:
//!
//! - the location table (`measures_id_map.csv`), parsed line by line; bad
//!   lines, including lines that are not UTF-8, are skipped with a warning
//! - the binary event log (`profiler_session.bin`), memory-mapped and decoded
//!   as whole 24-byte records
//!
//! Each record becomes one [`SessionRow`] joined with its location. Records
//! whose id is not in the table keep empty location fields.

use crate::event::{decode_records, EventRecord, RECORD_SIZE};
use crate::location::{location_key, Location};
use crate::recorder::{LOCATION_TABLE_FILENAME, SESSION_FILENAME};
use fnv::FnvHashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Progress is published every this many records
const PROGRESS_STRIDE: usize = 4096;

/// Errors that abort a whole load
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session artifact not found: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("Failed to read session artifact {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for session loading
pub type Result<T> = std::result::Result<T, SessionError>;

/// One recorded event joined with its location
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionRow {
    pub time: f64,
    pub duration: f64,
    pub path: String,
    pub line: u32,
    pub function: String,
    pub label: String,
}

impl SessionRow {
    /// Join a record with its location, or with empty fields if unknown
    pub fn from_record(record: &EventRecord, location: Option<&Location>) -> Self {
        match location {
            Some(location) => Self {
                time: record.time,
                duration: record.duration,
                path: location.path.clone(),
                line: location.line,
                function: location.function.clone(),
                label: location.label.clone(),
            },
            None => Self {
                time: record.time,
                duration: record.duration,
                ..Self::default()
            },
        }
    }

    /// Canonical grouping key: `path(line): function`
    pub fn key(&self) -> String {
        location_key(&self.path, self.line, &self.function)
    }

    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

/// Load fraction shared between a loading thread and a display thread
///
/// Holds an `f64` in `0.0..=1.0` as raw bits.
#[derive(Debug, Default)]
pub struct LoadProgress(AtomicU64);

impl LoadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, fraction: f64) {
        self.0
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.set(1.0);
    }

    pub fn is_finished(&self) -> bool {
        self.get() >= 1.0
    }
}

/// Parse a location table, skipping malformed lines
///
/// Lines are decoded one at a time, so a line that is not valid UTF-8 only
/// loses that location.
pub fn parse_location_table(contents: &[u8]) -> FnvHashMap<u64, Location> {
    let mut table = FnvHashMap::default();
    for (number, raw) in contents.split(|&b| b == b'\n').enumerate() {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(line = number + 1, error = %e, "skipping non UTF-8 location table line");
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match Location::from_table_line(line) {
            Ok(location) => {
                table.entry(location.id).or_insert(location);
            }
            Err(reason) => {
                tracing::warn!(line = number + 1, %reason, "skipping malformed location table line");
            }
        }
    }
    table
}

/// Read the location table of the session in `base_path`
pub fn read_location_table(base_path: &Path) -> Result<FnvHashMap<u64, Location>> {
    let path = base_path.join(LOCATION_TABLE_FILENAME);
    let contents = fs::read(&path).map_err(|source| artifact_error(&path, source))?;
    Ok(parse_location_table(&contents))
}

fn artifact_error(path: &Path, source: io::Error) -> SessionError {
    if source.kind() == io::ErrorKind::NotFound {
        SessionError::MissingArtifact {
            path: path.to_path_buf(),
        }
    } else {
        SessionError::Unreadable {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Join decoded log bytes with the location table
///
/// `progress` is advanced by the fraction of `bytes` consumed.
pub fn join_records(
    bytes: &[u8],
    table: &FnvHashMap<u64, Location>,
    progress: Option<&LoadProgress>,
) -> Vec<SessionRow> {
    let total = bytes.len().max(1) as f64;
    let mut rows = Vec::with_capacity(bytes.len() / RECORD_SIZE);
    let mut unresolved = 0usize;

    for (index, record) in decode_records(bytes).enumerate() {
        let location = table.get(&record.location_id);
        if location.is_none() {
            unresolved += 1;
        }
        rows.push(SessionRow::from_record(&record, location));

        if let Some(progress) = progress {
            if index % PROGRESS_STRIDE == 0 {
                progress.set(((index + 1) * RECORD_SIZE) as f64 / total);
            }
        }
    }

    if unresolved > 0 {
        tracing::warn!(unresolved, "events reference locations missing from the table");
    }
    rows
}

/// Load every event of the session stored in `base_path`
pub fn load(base_path: impl AsRef<Path>) -> Result<Vec<SessionRow>> {
    load_with_progress(base_path, None)
}

/// Load a session, publishing the fraction of log bytes processed
///
/// On failure no rows are returned; `progress` is left where it stopped.
pub fn load_with_progress(
    base_path: impl AsRef<Path>,
    progress: Option<&LoadProgress>,
) -> Result<Vec<SessionRow>> {
    let base_path = base_path.as_ref();
    let table = read_location_table(base_path)?;

    let log_path = base_path.join(SESSION_FILENAME);
    let file = File::open(&log_path).map_err(|source| artifact_error(&log_path, source))?;
    let len = file
        .metadata()
        .map_err(|source| artifact_error(&log_path, source))?
        .len();

    let rows = if len < RECORD_SIZE as u64 {
        Vec::new()
    } else {
        // SAFETY: the log is only read after its recording session finished;
        // concurrent writers are unsupported.
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|source| artifact_error(&log_path, source))?;
        join_records(&mmap, &table, progress)
    };

    if let Some(progress) = progress {
        progress.finish();
    }
    tracing::debug!(
        rows = rows.len(),
        locations = table.len(),
        path = %base_path.display(),
        "session loaded"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_session(dir: &Path, table: &str, records: &[EventRecord]) {
        fs::write(dir.join(LOCATION_TABLE_FILENAME), table).unwrap();
        let bytes: Vec<u8> = records.iter().flat_map(|r| r.to_bytes()).collect();
        fs::write(dir.join(SESSION_FILENAME), bytes).unwrap();
    }

    #[test]
    fn test_parse_location_table_skips_bad_lines() {
        let table = parse_location_table(
            b"a.rs;1;f;;10\nbroken line\nb.rs;x;g;;11\nc.rs;3;h;lbl;zz\n\nd.rs;4;k;;12\r\n",
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table[&10].path, "a.rs");
        assert_eq!(table[&12].function, "k");
    }

    #[test]
    fn test_load_skips_non_utf8_table_line() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(LOCATION_TABLE_FILENAME),
            b"a.rs;1;f;;10\nb\xff.rs;2;g;;11\nc.rs;3;h;;12\n",
        )
        .unwrap();
        let log: Vec<u8> = [EventRecord::new(0.0, 10, 0.5), EventRecord::new(1.0, 12, 0.5)]
            .iter()
            .flat_map(|r| r.to_bytes())
            .collect();
        fs::write(dir.path().join(SESSION_FILENAME), log).unwrap();

        let table = read_location_table(dir.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.contains_key(&11));

        let rows = load(dir.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].path, "a.rs");
        assert_eq!(rows[1].path, "c.rs");
    }

    #[test]
    fn test_join_records_ignores_trailing_bytes() {
        let mut table = FnvHashMap::default();
        table.insert(
            10,
            Location {
                id: 10,
                path: "a.rs".to_string(),
                line: 1,
                function: "f".to_string(),
                label: String::new(),
            },
        );
        let mut bytes: Vec<u8> = [EventRecord::new(0.0, 10, 1.0), EventRecord::new(2.0, 10, 0.5)]
            .iter()
            .flat_map(|r| r.to_bytes())
            .collect();
        bytes.extend_from_slice(&[0xff; RECORD_SIZE - 1]);

        let rows = join_records(&bytes, &table, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].time, 2.0);
        assert_eq!(rows[1].function, "f");
    }

    #[test]
    fn test_load_joins_rows() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            "a.rs;1;f;first;10\nb.rs;2;g;;20\n",
            &[
                EventRecord::new(0.0, 10, 0.5),
                EventRecord::new(1.0, 20, 0.25),
                EventRecord::new(2.0, 10, 0.125),
            ],
        );

        let rows = load(dir.path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].path, "a.rs");
        assert_eq!(rows[0].label, "first");
        assert_eq!(rows[1].function, "g");
        assert_eq!(rows[2].duration, 0.125);
    }

    #[test]
    fn test_load_unknown_id_keeps_row() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), "a.rs;1;f;;10\n", &[EventRecord::new(3.0, 99, 1.0)]);

        let rows = load(dir.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, "");
        assert_eq!(rows[0].line, 0);
        assert_eq!(rows[0].function, "");
        assert_eq!(rows[0].time, 3.0);
    }

    #[test]
    fn test_load_empty_log() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), "", &[]);
        assert!(load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_load_ignores_truncated_record() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), "a.rs;1;f;;10\n", &[EventRecord::new(0.0, 10, 1.0)]);
        let log = dir.path().join(SESSION_FILENAME);
        let mut bytes = fs::read(&log).unwrap();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5]);
        fs::write(&log, bytes).unwrap();

        assert_eq!(load(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_load_missing_table_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SESSION_FILENAME), b"").unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, SessionError::MissingArtifact { .. }));
    }

    #[test]
    fn test_load_missing_log_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LOCATION_TABLE_FILENAME), "a.rs;1;f;;10\n").unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, SessionError::MissingArtifact { ref path } if path.ends_with(SESSION_FILENAME)));
    }

    #[test]
    fn test_progress_reaches_one() {
        let dir = TempDir::new().unwrap();
        let records: Vec<_> = (0..10_000)
            .map(|i| EventRecord::new(i as f64, 10, 0.001))
            .collect();
        write_session(dir.path(), "a.rs;1;f;;10\n", &records);

        let progress = LoadProgress::new();
        assert_eq!(progress.get(), 0.0);
        let rows = load_with_progress(dir.path(), Some(&progress)).unwrap();
        assert_eq!(rows.len(), 10_000);
        assert!(progress.is_finished());
    }

    #[test]
    fn test_progress_clamped() {
        let progress = LoadProgress::new();
        progress.set(2.0);
        assert_eq!(progress.get(), 1.0);
        progress.set(-1.0);
        assert_eq!(progress.get(), 0.0);
    }

    #[test]
    fn test_row_key() {
        let row = SessionRow {
            path: "a.rs".to_string(),
            line: 4,
            function: "f".to_string(),
            ..SessionRow::default()
        };
        assert_eq!(row.key(), "a.rs(4): f");
    }
}
