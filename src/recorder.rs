//! Scope recording sessions
//!
//! A [`ProfilingSession`] owns the append-only event log and the location
//! registry of one recording run. Instrumented code opens a scope with
//! [`ProfilingSession::begin_scope`] (or the [`MeasureScope`] guard, or the
//! [`measure_scope!`](crate::measure_scope) macro) and every completed scope
//! appends one 24-byte record to the log with a single `write`.
//!
//! Recording never fails the host program: before `initialize`, after
//! `finalize`, or while disabled, ending a scope is a no-op. A scope ending
//! while recording is enabled but the log is not open is reported once
//! through `tracing` and otherwise ignored.
//!
//! ```text
//! uninitialized ──initialize──► recording (enabled ⇄ disabled) ──finalize──► uninitialized
//! ```

use crate::event::EventRecord;
use crate::location::{CallSite, LocationRegistry};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;

/// Binary event log file name inside the session directory
pub const SESSION_FILENAME: &str = "profiler_session.bin";

/// Location table file name inside the session directory
pub const LOCATION_TABLE_FILENAME: &str = "measures_id_map.csv";

/// Source of registry tokens; 0 is never handed out
static NEXT_REGISTRY_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_registry_token() -> u64 {
    NEXT_REGISTRY_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Errors raised by session lifecycle operations
///
/// Recording itself never returns errors.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Failed to create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open event log {}: {source}", path.display())]
    OpenLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write location table {}: {source}", path.display())]
    WriteTable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for recorder lifecycle operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// An open scope: which location, and when it started
#[derive(Debug)]
pub struct ScopeHandle {
    location_id: u64,
    start: Instant,
}

impl ScopeHandle {
    pub fn location_id(&self) -> u64 {
        self.location_id
    }

    pub fn start(&self) -> Instant {
        self.start
    }
}

#[derive(Debug, Default)]
struct SessionState {
    log: Option<File>,
    output_dir: Option<PathBuf>,
    started: Option<Instant>,
    registry: LocationRegistry,
}

/// One recording run
///
/// Share it between threads by reference or `Arc`; all mutable state sits
/// behind a single mutex that is held for one append or one registry insert.
/// Entering a scope takes no lock once its call site is in the current
/// registry, and none at all while recording is disabled.
///
/// # Example
/// ```no_run
/// use scopeprof::recorder::ProfilingSession;
///
/// let session = ProfilingSession::new();
/// session.initialize("/tmp/profile").unwrap();
///
/// let id = session.register(file!(), line!(), "main", "setup");
/// let handle = session.begin_scope(id);
/// // ... work ...
/// session.end_scope(handle);
///
/// session.finalize().unwrap();
/// ```
#[derive(Debug)]
pub struct ProfilingSession {
    enabled: AtomicBool,
    not_initialized_reported: AtomicBool,
    events_written: AtomicU64,
    /// Identifies the current registry; changes on every `initialize`
    registry_token: AtomicU64,
    state: Mutex<SessionState>,
}

impl Default for ProfilingSession {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            not_initialized_reported: AtomicBool::new(false),
            events_written: AtomicU64::new(0),
            registry_token: AtomicU64::new(next_registry_token()),
            state: Mutex::new(SessionState::default()),
        }
    }
}

impl ProfilingSession {
    /// Create an inert session; nothing is recorded until `initialize`
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // A panic in one instrumented thread must not stop the others
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the event log in `output_dir` and start recording
    ///
    /// The directory is created if needed. An already initialized session is
    /// finalized first. Each initialization starts an empty location
    /// registry, so the table written by `finalize` lists only the call sites
    /// registered since.
    pub fn initialize(&self, output_dir: impl AsRef<Path>) -> Result<()> {
        let output_dir = output_dir.as_ref();
        if self.is_initialized() {
            self.finalize()?;
        }

        fs::create_dir_all(output_dir).map_err(|source| RecorderError::CreateDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let log_path = output_dir.join(SESSION_FILENAME);
        let log = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_path)
            .map_err(|source| RecorderError::OpenLog {
                path: log_path.clone(),
                source,
            })?;

        let mut state = self.lock();
        state.log = Some(log);
        state.output_dir = Some(output_dir.to_path_buf());
        state.started = Some(Instant::now());
        state.registry = LocationRegistry::new();
        self.registry_token.store(next_registry_token(), Ordering::Release);
        drop(state);

        self.events_written.store(0, Ordering::Relaxed);
        self.not_initialized_reported.store(false, Ordering::Relaxed);
        self.enabled.store(true, Ordering::Release);

        tracing::debug!(path = %log_path.display(), "profiling session initialized");
        Ok(())
    }

    /// Close the event log and write the location table
    ///
    /// Recording becomes inert again. Calling this on a session that is not
    /// initialized does nothing.
    pub fn finalize(&self) -> Result<()> {
        self.enabled.store(false, Ordering::Release);

        let mut state = self.lock();
        let Some(log) = state.log.take() else {
            return Ok(());
        };
        drop(log);
        state.started = None;
        let output_dir = state.output_dir.take().unwrap_or_default();

        let table_path = output_dir.join(LOCATION_TABLE_FILENAME);
        let write_table = || -> io::Result<()> {
            let mut writer = BufWriter::new(File::create(&table_path)?);
            state.registry.write_table(&mut writer)?;
            writer.flush()
        };
        write_table().map_err(|source| RecorderError::WriteTable {
            path: table_path.clone(),
            source,
        })?;

        tracing::debug!(
            locations = state.registry.len(),
            events = self.events_written.load(Ordering::Relaxed),
            "profiling session finalized"
        );
        Ok(())
    }

    /// Resume recording; the open log and registry are kept
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Pause recording; the open log and registry are kept
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().log.is_some()
    }

    /// Number of records appended since the last `initialize`
    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }

    /// Number of distinct locations registered so far
    pub fn location_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// Register a call site and return its id
    pub fn register(&self, path: &str, line: u32, function: &str, label: &str) -> u64 {
        self.lock().registry.register(path, line, function, label)
    }

    /// Register a static call site and return its id
    pub fn register_site(&self, site: &CallSite) -> u64 {
        self.lock().registry.register_site(site)
    }

    /// Start timing a scope at `location_id`
    pub fn begin_scope(&self, location_id: u64) -> ScopeHandle {
        ScopeHandle {
            location_id,
            start: Instant::now(),
        }
    }

    /// Finish a scope and append its record
    pub fn end_scope(&self, handle: ScopeHandle) {
        let end = Instant::now();
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }

        let mut state = self.lock();
        let Some(started) = state.started else {
            self.report_not_initialized();
            return;
        };
        let Some(log) = state.log.as_mut() else {
            self.report_not_initialized();
            return;
        };

        let record = EventRecord::new(
            handle.start.saturating_duration_since(started).as_secs_f64(),
            handle.location_id,
            end.saturating_duration_since(handle.start).as_secs_f64(),
        );
        match log.write_all(&record.to_bytes()) {
            Ok(()) => {
                self.events_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error = %e, location_id = handle.location_id, "dropped scope record");
            }
        }
    }

    /// Open a guard that records a scope at `site` when dropped
    ///
    /// While recording is disabled the guard is inert and the site is not
    /// registered. Otherwise the site is registered on its first entry into
    /// the current registry; later entries skip the lock.
    pub fn scope(&self, site: &CallSite) -> MeasureScope<'_> {
        if !self.is_enabled() {
            return MeasureScope {
                session: self,
                handle: None,
            };
        }

        let token = self.registry_token.load(Ordering::Acquire);
        if !site.is_registered_in(token) {
            self.register_site(site);
            site.mark_registered(token);
        }
        MeasureScope {
            session: self,
            handle: Some(self.begin_scope(site.id())),
        }
    }

    /// Time a closure as one scope at `site`
    ///
    /// # Example
    /// ```
    /// use scopeprof::location::CallSite;
    /// use scopeprof::recorder::ProfilingSession;
    ///
    /// static SITE: CallSite = CallSite::new(file!(), line!(), "doc", "sum");
    /// let session = ProfilingSession::new();
    /// let total = session.measure(&SITE, || (1..=10).sum::<u32>());
    /// assert_eq!(total, 55);
    /// ```
    pub fn measure<F, R>(&self, site: &CallSite, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _scope = self.scope(site);
        f()
    }

    fn report_not_initialized(&self) {
        if !self.not_initialized_reported.swap(true, Ordering::Relaxed) {
            tracing::warn!("scope ended before the profiling session was initialized; recording skipped");
        }
    }
}

impl Drop for ProfilingSession {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!(error = %e, "failed to finalize profiling session");
        }
    }
}

/// Scope guard: ends its scope on drop, including during unwinding
#[must_use = "the scope is recorded when the guard is dropped"]
#[derive(Debug)]
pub struct MeasureScope<'a> {
    session: &'a ProfilingSession,
    handle: Option<ScopeHandle>,
}

impl MeasureScope<'_> {
    pub fn location_id(&self) -> Option<u64> {
        self.handle.as_ref().map(ScopeHandle::location_id)
    }
}

impl Drop for MeasureScope<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.session.end_scope(handle);
        }
    }
}

/// Time the rest of the enclosing block as one scope
///
/// The call site (file, line, enclosing function, optional label) is resolved
/// once per expansion and cached in a `static`.
///
/// ```
/// use scopeprof::measure_scope;
/// use scopeprof::recorder::ProfilingSession;
///
/// fn work(session: &ProfilingSession) -> u64 {
///     measure_scope!(session, "work");
///     (0..100).sum()
/// }
///
/// let dir = tempfile::tempdir().unwrap();
/// let session = ProfilingSession::new();
/// session.initialize(dir.path()).unwrap();
/// assert_eq!(work(&session), 4950);
/// assert_eq!(session.location_count(), 1);
/// ```
#[macro_export]
macro_rules! measure_scope {
    ($session:expr) => {
        $crate::measure_scope!($session, "");
    };
    ($session:expr, $label:expr) => {
        let _measure_scope_guard = {
            static SITE: ::std::sync::OnceLock<$crate::location::CallSite> =
                ::std::sync::OnceLock::new();
            let site = SITE.get_or_init(|| {
                fn here() {}
                $crate::location::CallSite::new(
                    file!(),
                    line!(),
                    $crate::location::enclosing_function(::std::any::type_name_of_val(&here)),
                    $label,
                )
            });
            ($session).scope(site)
        };
    };
}
