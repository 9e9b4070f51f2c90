//! Performance statistics collection for `--stats` output.

use std::time::{Duration, Instant};

/// Collects phase timings for one run.
///
/// Created when `--stats` is passed, threaded as `Option<&mut Stats>`.
/// Zero cost when `None` — no timing calls, no counter increments.
pub struct Stats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    pub steps: u32,
    pub exchange: Duration,
    pub compute: Duration,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            steps: 0,
            exchange: Duration::ZERO,
            compute: Duration::ZERO,
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== Heatsim Performance Stats ===");

        for (name, dur) in &self.phases {
            eprintln!("  {:<24} {:>8.3}s", name, dur.as_secs_f64());
        }

        if self.steps > 0 {
            eprintln!("  Steps:                  {}", self.steps);
            eprintln!("    Halo exchange:        {:>8.3}s", self.exchange.as_secs_f64());
            eprintln!("    Local compute:        {:>8.3}s", self.compute.as_secs_f64());
        }

        eprintln!("  ─────────────────────────────");
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
    }
}
