//! Session metrics using metrics-rs.
//!
//! Counters are recorded once per finished session from [`TrapStats`], never
//! from the trap handlers themselves.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_histogram, histogram,
};
use parking_lot::RwLock;

use crate::report::MatchStatus;
use crate::session::TrapStats;

// ============================================================================
// Metric descriptions
// ============================================================================

/// Initialize metric descriptions.
///
/// Call this once at startup to register metric descriptions.
pub fn init() {
    describe_counter!("risu_traps_total", Unit::Count, "Total traps handled");
    describe_counter!(
        "risu_compares_total",
        Unit::Count,
        "Total register snapshot exchanges"
    );
    describe_counter!(
        "risu_mem_compares_total",
        Unit::Count,
        "Total scratch block exchanges"
    );
    describe_counter!(
        "risu_tolerated_divergences_total",
        Unit::Count,
        "Vector registers corrected under summary overflow"
    );
    describe_counter!(
        "risu_mismatches_total",
        Unit::Count,
        "Traps that ended in a mismatch verdict"
    );
    describe_counter!(
        "risu_sessions_total",
        Unit::Count,
        "Finished sessions by match status"
    );
    describe_histogram!(
        "risu_session_traps",
        Unit::Count,
        "Traps handled per session"
    );
}

// ============================================================================
// Metric recording functions
// ============================================================================

/// Record the counters of a finished session.
#[allow(clippy::cast_precision_loss)]
pub fn record_session(stats: &TrapStats, status: MatchStatus) {
    counter!("risu_traps_total").increment(stats.traps);
    counter!("risu_compares_total").increment(stats.compares);
    counter!("risu_mem_compares_total").increment(stats.mem_compares);
    counter!("risu_tolerated_divergences_total").increment(stats.tolerated);
    counter!("risu_mismatches_total").increment(stats.mismatches);

    let labels = [("status", status.label().to_string())];
    counter!("risu_sessions_total", &labels).increment(1);
    histogram!("risu_session_traps").record(stats.traps as f64);
}

// ============================================================================
// CLI Recorder for terminal output
// ============================================================================

/// Everything recorded by finished sessions, keyed by rendered metric key.
#[derive(Default)]
struct Totals {
    counters: HashMap<String, u64>,
    histograms: HashMap<String, Vec<f64>>,
}

impl Totals {
    fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    fn sessions(&self, status: MatchStatus) -> u64 {
        self.counter(&format!("risu_sessions_total{{status={}}}", status.label()))
    }
}

type SharedTotals = Arc<RwLock<Totals>>;

struct CliCounter {
    key: String,
    totals: SharedTotals,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        *self.totals.write().counters.entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.totals.write().counters.insert(self.key.clone(), value);
    }
}

struct CliHistogram {
    key: String,
    totals: SharedTotals,
}

impl metrics::HistogramFn for CliHistogram {
    fn record(&self, value: f64) {
        self.totals.write().histograms.entry(self.key.clone()).or_default().push(value);
    }
}

/// CLI recorder that keeps session totals in memory for a closing summary.
///
/// Gauges are not used by this crate and are discarded.
pub struct CliRecorder {
    totals: SharedTotals,
}

impl CliRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            totals: SharedTotals::default(),
        }
    }

    /// Install this recorder as the global metrics recorder.
    ///
    /// Returns `None` if a recorder is already installed.
    #[must_use]
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = self.handle();
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }

    fn handle(&self) -> CliRecorderHandle {
        CliRecorderHandle {
            totals: Arc::clone(&self.totals),
        }
    }
}

impl Default for CliRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a key as `name{label=value,...}`.
fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            totals: Arc::clone(&self.totals),
        }))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(CliHistogram {
            key: key_to_string(key),
            totals: Arc::clone(&self.totals),
        }))
    }
}

/// Handle for reading session totals after installing the CLI recorder.
pub struct CliRecorderHandle {
    totals: SharedTotals,
}

impl CliRecorderHandle {
    /// Get a counter value by rendered key.
    #[must_use]
    pub fn get_counter(&self, key: &str) -> Option<u64> {
        self.totals.read().counters.get(key).copied()
    }

    /// Number of finished sessions that ended with `status`.
    #[must_use]
    pub fn sessions(&self, status: MatchStatus) -> u64 {
        self.totals.read().sessions(status)
    }

    /// Write the session summary: outcomes by status, then trap totals.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    #[allow(clippy::cast_precision_loss)]
    pub fn write_summary<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let totals = self.totals.read();
        let matched = totals.sessions(MatchStatus::Match);
        let failed = totals.sessions(MatchStatus::Fail);
        if matched + failed == 0 {
            return writeln!(out, "No sessions recorded.");
        }

        writeln!(out)?;
        writeln!(out, "## Session Summary")?;
        writeln!(out)?;
        writeln!(
            out,
            "  sessions:   {} ({} match, {} fail)",
            matched + failed,
            matched,
            failed
        )?;

        let traps = totals.counter("risu_traps_total");
        match totals.histograms.get("risu_session_traps").filter(|v| !v.is_empty()) {
            Some(per_session) => {
                let min = per_session.iter().copied().fold(f64::INFINITY, f64::min);
                let max = per_session.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let avg = per_session.iter().sum::<f64>() / per_session.len() as f64;
                writeln!(
                    out,
                    "  traps:      {traps} (per session min {min:.0}, max {max:.0}, avg {avg:.2})"
                )?;
            }
            None => writeln!(out, "  traps:      {traps}")?,
        }
        writeln!(
            out,
            "  exchanges:  {} registers, {} memory",
            totals.counter("risu_compares_total"),
            totals.counter("risu_mem_compares_total")
        )?;
        writeln!(
            out,
            "  tolerated:  {} vector divergences",
            totals.counter("risu_tolerated_divergences_total")
        )?;
        writeln!(
            out,
            "  mismatches: {}",
            totals.counter("risu_mismatches_total")
        )?;
        writeln!(out)
    }

    /// Print the session summary to stdout.
    pub fn print_summary(&self) {
        // Nothing useful to do if stdout is gone at exit.
        let _ = self.write_summary(&mut io::stdout().lock());
    }
}
