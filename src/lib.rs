//! scopeprof - scope-level instrumentation profiler
//!
//! The recording half runs inside the profiled program: call sites are
//! registered once in a [`location::LocationRegistry`] and every completed
//! scope appends a fixed-size record to a binary log
//! ([`recorder::ProfilingSession`], [`measure_scope!`]).
//!
//! The analysis half runs afterwards: [`loader`] reads a session back,
//! [`aggregate`] computes per-location statistics and rankings, and
//! [`reducer`] thins samples and activity rates to a fixed budget for
//! interactive display.

pub mod aggregate;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod csv_output;
pub mod event;
pub mod loader;
pub mod location;
pub mod recorder;
pub mod reducer;
pub mod summary;
