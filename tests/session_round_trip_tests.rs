//! Integration tests: record a session, load it back, aggregate it

use scopeprof::aggregate::{aggregate, LocationOrder};
use scopeprof::event::EventRecord;
use scopeprof::loader::{self, SessionError};
use scopeprof::location::{location_id, LocationRegistry};
use scopeprof::measure_scope;
use scopeprof::recorder::{ProfilingSession, LOCATION_TABLE_FILENAME, SESSION_FILENAME};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// Write a session directory by hand, with exact times
fn write_session(dir: &Path, registry: &LocationRegistry, records: &[EventRecord]) {
    let mut table = Vec::new();
    registry.write_table(&mut table).unwrap();
    fs::write(dir.join(LOCATION_TABLE_FILENAME), table).unwrap();
    let log: Vec<u8> = records.iter().flat_map(|r| r.to_bytes()).collect();
    fs::write(dir.join(SESSION_FILENAME), log).unwrap();
}

#[test]
fn test_round_trip_zero_events() {
    let dir = TempDir::new().unwrap();
    let session = ProfilingSession::new();
    session.initialize(dir.path()).unwrap();
    session.finalize().unwrap();

    let rows = loader::load(dir.path()).unwrap();
    assert!(rows.is_empty());
    assert!(aggregate(&rows).is_empty());
}

#[test]
fn test_round_trip_preserves_every_event() {
    let dir = TempDir::new().unwrap();
    let session = ProfilingSession::new();
    session.initialize(dir.path()).unwrap();

    let parse = session.register("src/parse.rs", 12, "parse", "tokens");
    let emit = session.register("src/emit.rs", 40, "emit", "");
    for i in 0..250 {
        let id = if i % 5 == 0 { emit } else { parse };
        let handle = session.begin_scope(id);
        session.end_scope(handle);
    }
    session.finalize().unwrap();

    let rows = loader::load(dir.path()).unwrap();
    assert_eq!(rows.len(), 250);
    assert_eq!(rows.iter().filter(|r| r.function == "emit").count(), 50);
    assert!(rows
        .iter()
        .filter(|r| r.function == "parse")
        .all(|r| r.path == "src/parse.rs" && r.line == 12 && r.label == "tokens"));
    assert!(rows.windows(2).all(|w| w[0].time <= w[1].time));
    assert!(rows.iter().all(|r| r.duration >= 0.0));

    let stats = aggregate(&rows);
    assert_eq!(stats.len(), 2);
    assert_eq!(stats.total_hits(), 250);
}

#[test]
fn test_macro_records_enclosing_function() {
    fn decode_frame(session: &ProfilingSession) -> usize {
        measure_scope!(session, "frame");
        (0..64).filter(|n| n % 3 == 0).count()
    }

    let dir = TempDir::new().unwrap();
    let session = ProfilingSession::new();
    session.initialize(dir.path()).unwrap();
    for _ in 0..3 {
        decode_frame(&session);
    }
    session.finalize().unwrap();

    let rows = loader::load(dir.path()).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].function.ends_with("decode_frame"), "{}", rows[0].function);
    assert!(rows[0].path.ends_with("session_round_trip_tests.rs"));
    assert_eq!(rows[0].label, "frame");
}

#[test]
fn test_concurrent_recording() {
    let dir = TempDir::new().unwrap();
    let session = Arc::new(ProfilingSession::new());
    session.initialize(dir.path()).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                let id = session.register("src/worker.rs", 7, "step", "");
                let own = session.register("src/worker.rs", 100 + worker, "own", "");
                for _ in 0..200 {
                    session.end_scope(session.begin_scope(id));
                }
                session.end_scope(session.begin_scope(own));
                id
            })
        })
        .collect();
    let ids: Vec<u64> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    session.finalize().unwrap();

    assert!(ids.iter().all(|&id| id == location_id("src/worker.rs", 7, "step")));
    assert_eq!(session.location_count(), 9);

    let rows = loader::load(dir.path()).unwrap();
    assert_eq!(rows.len(), 8 * 201);
    let stats = aggregate(&rows);
    assert_eq!(stats.get("src/worker.rs(7): step").unwrap().hits(), 1600);
    assert_eq!(stats.len(), 9);
}

#[test]
fn test_two_location_example() {
    let dir = TempDir::new().unwrap();
    let mut registry = LocationRegistry::new();
    let a = registry.register("src/app.rs", 10, "poll", "");
    let b = registry.register("src/app.rs", 20, "render", "");

    let mut records: Vec<_> = (0..10)
        .map(|i| EventRecord::new(i as f64, a, 0.001))
        .collect();
    records.insert(5, EventRecord::new(4.0, b, 0.5));
    write_session(dir.path(), &registry, &records);

    let rows = loader::load(dir.path()).unwrap();
    let stats = aggregate(&rows);

    let poll = stats.get("src/app.rs(10): poll").unwrap();
    assert_eq!(poll.hits(), 10);
    assert!((poll.mean_duration - 0.001).abs() < 1e-12);
    assert!(poll.std_deviation < 1e-12);
    let frequency = poll.mean_frequency.unwrap();
    assert!((frequency - 10.0 / 9.001).abs() < 1e-9);

    let render = stats.get("src/app.rs(20): render").unwrap();
    assert_eq!(render.mean_frequency, None);
    assert_eq!(render.duration_rank, 0);
    assert_eq!(poll.duration_rank, 1);
    assert_eq!(poll.appearance_rank, 0);

    let first = stats.iter(LocationOrder::Duration).next().unwrap();
    assert_eq!(first.function, "render");
    assert!((stats.end_time() - 9.001).abs() < 1e-12);
}

#[test]
fn test_unknown_ids_keep_rows() {
    let dir = TempDir::new().unwrap();
    let mut registry = LocationRegistry::new();
    let known = registry.register("src/a.rs", 1, "known", "");
    write_session(
        dir.path(),
        &registry,
        &[
            EventRecord::new(0.0, known, 0.1),
            EventRecord::new(1.0, 0xdead_beef, 0.2),
        ],
    );

    let rows = loader::load(dir.path()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].path, "");
    assert_eq!(rows[1].function, "");
    assert_eq!(aggregate(&rows).len(), 2);
}

#[test]
fn test_missing_directory_fails_without_rows() {
    let dir = TempDir::new().unwrap();
    let err = loader::load(dir.path().join("nowhere")).unwrap_err();
    assert!(matches!(err, SessionError::MissingArtifact { .. }));
}

#[test]
fn test_recording_after_finalize_is_dropped() {
    let dir = TempDir::new().unwrap();
    let session = ProfilingSession::new();
    session.initialize(dir.path()).unwrap();
    let id = session.register("src/a.rs", 1, "f", "");
    session.end_scope(session.begin_scope(id));
    session.finalize().unwrap();
    session.end_scope(session.begin_scope(id));

    assert_eq!(loader::load(dir.path()).unwrap().len(), 1);
}
