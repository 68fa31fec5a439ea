//! Call-site identification and the location table
//!
//! Every instrumented scope is declared at a call site: a source path, a line
//! and the enclosing function, plus an optional free-form label. The call site
//! is reduced to a 64-bit id with a DJB2-style multiplicative hash so the hot
//! path only ever writes integers. The id -> call site mapping is kept in a
//! [`LocationRegistry`] and written next to the event log as a text table:
//!
//! ```text
//! path;line;function;label;id
//! ```
//!
//! Ids are not collision checked. Two distinct call sites hashing to the same
//! value are merged under the first registration.

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Field separator of the location table
pub const FIELD_SEPARATOR: char = ';';

/// Written in place of a separator inside a path or function name
pub const SEPARATOR_REPLACEMENT: char = ',';

/// DJB2 seed value
const DJB2_SEED: u64 = 5381;

/// Multiplicative string hash (`h = h * 33 + byte`), wrapping on overflow
///
/// Mirrors the interface of `fnv::FnvHasher` so it can be fed through the
/// [`Hasher`] trait, with an extra [`Djb2Hasher::add`] for the additive line
/// component of a location id.
#[derive(Debug, Clone, Copy)]
pub struct Djb2Hasher(u64);

impl Default for Djb2Hasher {
    fn default() -> Self {
        Self(DJB2_SEED)
    }
}

impl Djb2Hasher {
    /// Add a raw value to the running hash
    pub fn add(&mut self, value: u64) {
        self.0 = self.0.wrapping_add(value);
    }
}

impl Hasher for Djb2Hasher {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = self.0.wrapping_mul(33).wrapping_add(u64::from(byte));
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Compute the location id of a call site
///
/// The hash is seeded with the path, the line number is added, then the
/// function name is mixed in. The label does not participate.
///
/// # Example
/// ```
/// use scopeprof::location::location_id;
///
/// let a = location_id("src/main.rs", 10, "main");
/// assert_eq!(a, location_id("src/main.rs", 10, "main"));
/// assert_ne!(a, location_id("src/main.rs", 11, "main"));
/// ```
pub fn location_id(path: &str, line: u32, function: &str) -> u64 {
    let mut hasher = Djb2Hasher::default();
    hasher.write(path.as_bytes());
    hasher.add(u64::from(line));
    hasher.write(function.as_bytes());
    hasher.finish()
}

/// Turn the `type_name` of a helper item declared inside a function into the
/// function's path
///
/// `type_name_of_val(&here)` for `fn here() {}` declared inside `app::run`
/// yields `app::run::here`; inside a closure it yields
/// `app::run::{{closure}}::here`. Both map to `app::run`.
pub fn enclosing_function(type_name: &str) -> &str {
    let mut name = type_name.strip_suffix("::here").unwrap_or(type_name);
    while let Some(stripped) = name.strip_suffix("::{{closure}}") {
        name = stripped;
    }
    name
}

/// A resolved call site
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub id: u64,
    pub path: String,
    pub line: u32,
    pub function: String,
    pub label: String,
}

impl Location {
    /// Create a location, deriving its id from path, line and function
    pub fn new(path: &str, line: u32, function: &str, label: &str) -> Self {
        Self {
            id: location_id(path, line, function),
            path: path.to_string(),
            line,
            function: function.to_string(),
            label: label.to_string(),
        }
    }

    /// Canonical grouping key: `path(line): function`
    pub fn key(&self) -> String {
        location_key(&self.path, self.line, &self.function)
    }

    /// Short label for display: `file (line): function`
    pub fn display_name(&self) -> String {
        format!("{} ({}): {}", file_name(&self.path), self.line, self.function)
    }

    /// Format this location as one table line (without newline)
    ///
    /// Separators inside the path or function are written as
    /// [`SEPARATOR_REPLACEMENT`]; the label may keep them. The id is always
    /// the one hashed from the original names.
    pub fn to_table_line(&self) -> String {
        format!(
            "{path}{sep}{line}{sep}{function}{sep}{label}{sep}{id}",
            path = self.path.replace(FIELD_SEPARATOR, &SEPARATOR_REPLACEMENT.to_string()),
            line = self.line,
            function = self
                .function
                .replace(FIELD_SEPARATOR, &SEPARATOR_REPLACEMENT.to_string()),
            label = self.label,
            id = self.id,
            sep = FIELD_SEPARATOR,
        )
    }

    /// Parse one `path;line;function;label;id` table line
    ///
    /// The label is free-form and may itself contain separators, so the id is
    /// taken from the last field and the label is everything between the
    /// function and the id.
    pub fn from_table_line(line: &str) -> Result<Self, String> {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() < 5 {
            return Err(format!(
                "expected 5 fields, found {}: {:?}",
                fields.len(),
                line
            ));
        }

        let id_field = fields[fields.len() - 1].trim();
        let id = id_field
            .parse::<u64>()
            .map_err(|e| format!("invalid id {:?}: {}", id_field, e))?;
        let line_field = fields[1].trim();
        let line_number = line_field
            .parse::<u32>()
            .map_err(|e| format!("invalid line number {:?}: {}", line_field, e))?;

        Ok(Self {
            id,
            path: fields[0].to_string(),
            line: line_number,
            function: fields[2].to_string(),
            label: fields[3..fields.len() - 1].join(";"),
        })
    }
}

/// Canonical grouping key for a location triple
pub fn location_key(path: &str, line: u32, function: &str) -> String {
    format!("{}({}): {}", path, line, function)
}

/// Final path component, or the whole path if it has none
pub fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

/// Static description of an instrumented call site
///
/// Declared once per `measure_scope!` expansion. The id is computed on first
/// use and cached, as is the token of the last session registration the site
/// went into, so repeated entries skip the registry.
#[derive(Debug)]
pub struct CallSite {
    path: &'static str,
    line: u32,
    function: &'static str,
    label: &'static str,
    id: OnceLock<u64>,
    registered: AtomicU64,
}

impl CallSite {
    pub const fn new(
        path: &'static str,
        line: u32,
        function: &'static str,
        label: &'static str,
    ) -> Self {
        Self {
            path,
            line,
            function,
            label,
            id: OnceLock::new(),
            registered: AtomicU64::new(0),
        }
    }

    /// Whether this site was registered under `token` (never true for 0)
    pub fn is_registered_in(&self, token: u64) -> bool {
        token != 0 && self.registered.load(Ordering::Acquire) == token
    }

    /// Remember that this site is now in the registry identified by `token`
    pub fn mark_registered(&self, token: u64) {
        self.registered.store(token, Ordering::Release);
    }

    pub fn id(&self) -> u64 {
        *self
            .id
            .get_or_init(|| location_id(self.path, self.line, self.function))
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn function(&self) -> &'static str {
        self.function
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn to_location(&self) -> Location {
        Location {
            id: self.id(),
            path: self.path.to_string(),
            line: self.line,
            function: self.function.to_string(),
            label: self.label.to_string(),
        }
    }
}

/// Accumulated id -> location table of one recording session
#[derive(Debug, Default)]
pub struct LocationRegistry {
    locations: BTreeMap<u64, Location>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call site and return its id
    ///
    /// Repeated registrations return the cached id and leave the first entry
    /// (including its label) untouched.
    pub fn register(&mut self, path: &str, line: u32, function: &str, label: &str) -> u64 {
        let id = location_id(path, line, function);
        self.locations
            .entry(id)
            .or_insert_with(|| Location {
                id,
                path: path.to_string(),
                line,
                function: function.to_string(),
                label: label.to_string(),
            });
        id
    }

    /// Register a static call site without rehashing
    pub fn register_site(&mut self, site: &CallSite) -> u64 {
        let id = site.id();
        if !self.locations.contains_key(&id) {
            self.locations.insert(id, site.to_location());
        }
        id
    }

    pub fn get(&self, id: u64) -> Option<&Location> {
        self.locations.get(&id)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    /// Write the table, one `path;line;function;label;id` line per location
    pub fn write_table<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for location in self.locations.values() {
            writeln!(writer, "{}", location.to_table_line())?;
        }
        Ok(())
    }
}
