//! Record a small synthetic workload, then summarize it
//!
//! ```bash
//! cargo run --example record_workload -- /tmp/scopeprof-demo
//! cargo run -- /tmp/scopeprof-demo --window 0:0.5
//! ```

use anyhow::Result;
use scopeprof::analysis::AnalysisSession;
use scopeprof::aggregate::LocationOrder;
use scopeprof::config::AnalysisConfig;
use scopeprof::measure_scope;
use scopeprof::recorder::ProfilingSession;
use std::sync::Arc;
use std::thread;

fn checksum(session: &ProfilingSession, data: &[u8]) -> u32 {
    measure_scope!(session);
    data.iter()
        .fold(0u32, |acc, &b| acc.rotate_left(5) ^ u32::from(b))
}

fn render_frame(session: &ProfilingSession, frame: usize) -> u32 {
    measure_scope!(session, "frame");
    let data: Vec<u8> = (0..4096).map(|i| (i * frame) as u8).collect();
    (0..8).map(|_| checksum(session, &data)).fold(0, u32::wrapping_add)
}

fn main() -> Result<()> {
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "scopeprof-demo".to_string());

    let session = Arc::new(ProfilingSession::new());
    session.initialize(&output)?;

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                (0..200)
                    .map(|frame| render_frame(&session, frame + worker))
                    .fold(0u32, u32::wrapping_add)
            })
        })
        .collect();
    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("workload thread panicked"))?;
    }
    session.finalize()?;

    let analysis = AnalysisSession::open(&output, &AnalysisConfig::default())?;
    println!("Recorded {} events into {}", analysis.rows().len(), output);
    for element in analysis.stats().iter(LocationOrder::Duration) {
        println!(
            "{:>8} hits  {:>12.9}s mean  {}",
            element.hits(),
            element.mean_duration,
            element.display_name()
        );
    }
    Ok(())
}
