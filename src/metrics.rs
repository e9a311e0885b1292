//! Timing for start-up reads of an embedded tutorial

use std::time::{Duration, Instant};

/// Phase timings collected while detecting and reading a container
#[derive(Debug)]
pub struct ReadMetrics {
    start: Instant,
    phases: Vec<(String, Duration)>,
}

impl Default for ReadMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadMetrics {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            phases: Vec::new(),
        }
    }

    /// Add a phase timing
    pub fn add_phase(&mut self, name: impl Into<String>, duration: Duration) {
        self.phases.push((name.into(), duration));
    }

    /// Time a closure and record it as a phase
    pub fn time_phase<F, R>(&mut self, name: impl Into<String>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let phase_start = Instant::now();
        let result = f();
        self.phases.push((name.into(), phase_start.elapsed()));
        result
    }

    /// Recorded phases in order
    pub fn phases(&self) -> &[(String, Duration)] {
        &self.phases
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Sum of recorded phases
    pub fn recorded(&self) -> Duration {
        self.phases.iter().map(|(_, d)| *d).sum()
    }

    /// One line per phase, then the total
    pub fn report(&self) -> String {
        let mut out = String::from("embedded tutorial read:");
        for (name, duration) in &self.phases {
            out.push_str(&format!("\n  {:<16} {:>9.3} ms", name, millis(*duration)));
        }
        out.push_str(&format!("\n  {:<16} {:>9.3} ms", "total", millis(self.elapsed())));
        out
    }

    /// Emit the report at debug level
    pub fn log_report(&self) {
        for (name, duration) in &self.phases {
            tracing::debug!(phase = %name, ms = millis(*duration), "embedded read phase");
        }
        tracing::debug!(ms = millis(self.elapsed()), "embedded read total");
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
