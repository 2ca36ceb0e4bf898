//! Human-readable run summaries.

use std::io::{self, Write};

use crate::{config::JunctionConfig, metrics::JunctionMetrics, snapshot::Snapshot};

/// Prints summary statistics for a run.
pub struct Reporter<'a> {
    metrics: &'a JunctionMetrics,
    config: Option<&'a JunctionConfig>,
    final_state: Option<&'a Snapshot>,
}

impl<'a> Reporter<'a> {
    /// Create a new reporter
    pub fn new(metrics: &'a JunctionMetrics) -> Self {
        Self {
            metrics,
            config: None,
            final_state: None,
        }
    }

    /// Include the configuration the run used.
    pub fn with_config(mut self, config: &'a JunctionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Include the junction's state at the end of the run.
    pub fn with_final_state(mut self, snapshot: &'a Snapshot) -> Self {
        self.final_state = Some(snapshot);
        self
    }

    /// Write the summary to `out`.
    pub fn print_summary<W: Write>(&self, mut out: W) -> io::Result<()> {
        if let Some(config) = self.config {
            writeln!(out, "=== Junction Configuration ===")?;
            writeln!(out, "Seed:               {}", config.random_seed)?;
            writeln!(out, "Alpha:              {}", config.alpha)?;
            writeln!(
                out,
                "Max wait:           {:.1}s",
                config.max_wait_time.as_secs_f64()
            )?;
            writeln!(out, "Queue threshold:    {}", config.queue_threshold)?;
            writeln!(out, "Threshold policy:   {}", config.threshold_policy)?;
            for lane in &config.lanes {
                writeln!(
                    out,
                    "  Lane {} ({}): {:.1} vehicles/min",
                    lane.id, lane.direction, lane.arrivals_per_minute
                )?;
            }
            writeln!(out)?;
        }

        let metrics = self.metrics;

        writeln!(out, "=== Results ===")?;
        if let Some(duration) = metrics.observed_duration() {
            writeln!(out, "Observed duration:  {:.2}s", duration.as_secs_f64())?;
        }
        writeln!(out, "Arrivals:           {}", metrics.total_arrivals())?;
        writeln!(out, "Departures:         {}", metrics.total_departures())?;
        if let Some(throughput) = metrics.throughput_per_minute() {
            writeln!(out, "Throughput:         {throughput:.2} vehicles/min")?;
        }
        if let Some(wait) = metrics.mean_wait() {
            writeln!(out, "Mean wait:          {:.2}s", wait.as_secs_f64())?;
        }
        writeln!(out, "Phase changes:      {}", metrics.phase_changes())?;
        for (reason, count) in metrics.switches() {
            writeln!(out, "  {reason}: {count}")?;
        }
        if metrics.stale_departures() > 0 {
            writeln!(out, "Stale departures:   {}", metrics.stale_departures())?;
        }

        writeln!(out)?;
        writeln!(
            out,
            "{:<6} {:>8} {:>10} {:>11} {:>7} {:>10} {:>10} {:>9}",
            "lane", "arrivals", "departures", "activations", "forced", "mean wait", "max wait", "max gap"
        )?;
        for (id, lane) in metrics.lanes() {
            writeln!(
                out,
                "{:<6} {:>8} {:>10} {:>11} {:>7} {:>9.2}s {:>9.2}s {:>8.2}s",
                id.to_string(),
                lane.arrivals,
                lane.departures,
                lane.activations,
                lane.forced_switches,
                lane.mean_wait().unwrap_or_default().as_secs_f64(),
                lane.max_wait.as_secs_f64(),
                lane.max_gap.as_secs_f64(),
            )?;
        }

        if let Some(snapshot) = self.final_state {
            writeln!(out)?;
            writeln!(
                out,
                "At {:.2}s lane {} has right-of-way; {} vehicles queued",
                snapshot.now.as_secs_f64(),
                snapshot.active_lane,
                snapshot.total_queued()
            )?;
        }

        Ok(())
    }
}
