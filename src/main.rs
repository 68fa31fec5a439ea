use anyhow::{Context, Result};
use clap::Parser;
use scopeprof::analysis::AnalysisSession;
use scopeprof::cli::{Cli, OutputFormat};
use scopeprof::config::AnalysisConfig;
use scopeprof::csv_output;
use scopeprof::summary::{self, SummaryReport, WindowedReport};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Load the session, on a worker thread when progress is requested
fn open_session(dir: &Path, config: &AnalysisConfig, progress: bool) -> Result<AnalysisSession> {
    let analysis = if progress {
        let pending = AnalysisSession::spawn(dir, config)?;
        while !pending.is_finished() {
            eprint!("\rLoading {:5.1}%", pending.progress() * 100.0);
            std::thread::sleep(Duration::from_millis(50));
        }
        eprintln!("\rLoading 100.0%");
        pending.join()
    } else {
        AnalysisSession::open(dir, config)
    };
    analysis.with_context(|| format!("Failed to load session from {}", dir.display()))
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let base = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let config = args.apply_overrides(base);
    config.validate()?;

    let analysis = open_session(&args.session_dir, &config, args.progress)?;
    let order = config.order;

    if let Some(path) = &args.export_session {
        let mut out = create_output(path)?;
        csv_output::write_session_csv(analysis.rows(), &mut out)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if let Some(path) = &args.export_stats {
        let mut out = create_output(path)?;
        csv_output::write_stats_csv(analysis.stats(), order, &mut out)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let report = SummaryReport::new(analysis.stats(), order);
    let window_summary = args.window.map(|window| {
        let mut sampler = analysis.sampler();
        analysis.window_summary(&mut sampler, window)
    });

    // stdout carries exactly one document in the chosen format
    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    match (args.format, &window_summary) {
        (OutputFormat::Text, window) => {
            write!(stdout, "{}", report.to_text())?;
            if let Some(window) = window {
                write!(stdout, "{}", summary::window_text(window))?;
            }
        }
        (OutputFormat::Json, None) => writeln!(stdout, "{}", report.to_json()?)?,
        (OutputFormat::Json, Some(window)) => {
            let combined = WindowedReport {
                summary: &report,
                window,
            };
            writeln!(stdout, "{}", combined.to_json()?)?
        }
        (OutputFormat::Csv, window) => {
            csv_output::write_stats_csv(analysis.stats(), order, &mut stdout)?;
            if let Some(window) = window {
                eprint!("{}", summary::window_text(window));
            }
        }
    }

    Ok(())
}
