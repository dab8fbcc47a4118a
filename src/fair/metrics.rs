//! Opt-in timing hooks for the fairing pipeline.
//!
//! Timing is only collected when the `fair_metrics` feature is enabled and the
//! target is not WASM. Otherwise every call compiles down to invoking the
//! closure.
//!
//! ```ignore
//! let mut metrics = FairMetrics::default();
//! metrics.begin();
//! let adjacency = metrics.time(TimingBucket::Adjacency, || AdjacencyModel::build(&mesh))?;
//! if let Some(report) = metrics.end() {
//!     println!("adjacency: {} ns", report.adjacency_ns);
//! }
//! ```

/// Pipeline phases that accumulate time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    Adjacency,
    Partition,
    /// Weight evaluation and operator composition.
    Weights,
    Assembly,
    Solve,
    Relaxation,
    Writeback,
}

/// Cumulative nanoseconds per bucket.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FairTimingReport {
    pub adjacency_ns: u64,
    pub partition_ns: u64,
    pub weights_ns: u64,
    pub assembly_ns: u64,
    pub solve_ns: u64,
    pub relaxation_ns: u64,
    pub writeback_ns: u64,
}

impl FairTimingReport {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.adjacency_ns
            .saturating_add(self.partition_ns)
            .saturating_add(self.weights_ns)
            .saturating_add(self.assembly_ns)
            .saturating_add(self.solve_ns)
            .saturating_add(self.relaxation_ns)
            .saturating_add(self.writeback_ns)
    }

    /// Returns the total time in milliseconds (for display purposes).
    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }
}

/// Accumulator for timing fairing phases.
///
/// When the `fair_metrics` feature is disabled (or on WASM), all methods are
/// no-ops and [`end`](Self::end) returns `None`.
#[derive(Debug, Default)]
pub struct FairMetrics {
    #[cfg(all(feature = "fair_metrics", not(target_arch = "wasm32")))]
    report: FairTimingReport,
}

impl FairMetrics {
    /// Resets all timing counters to zero.
    pub fn begin(&mut self) {
        #[cfg(all(feature = "fair_metrics", not(target_arch = "wasm32")))]
        {
            self.report = FairTimingReport::default();
        }
    }

    /// Returns the accumulated timing report, or `None` if metrics are disabled.
    #[must_use]
    pub fn end(&self) -> Option<FairTimingReport> {
        #[cfg(all(feature = "fair_metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "fair_metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    /// Times `f` and adds the elapsed time to `bucket`.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "fair_metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            // Cap at u64::MAX to prevent overflow
            let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
            self.add_to_bucket(bucket, nanos);
            result
        }

        #[cfg(not(all(feature = "fair_metrics", not(target_arch = "wasm32"))))]
        {
            let _ = bucket;
            f()
        }
    }

    #[cfg(all(feature = "fair_metrics", not(target_arch = "wasm32")))]
    fn add_to_bucket(&mut self, bucket: TimingBucket, nanos: u64) {
        let slot = match bucket {
            TimingBucket::Adjacency => &mut self.report.adjacency_ns,
            TimingBucket::Partition => &mut self.report.partition_ns,
            TimingBucket::Weights => &mut self.report.weights_ns,
            TimingBucket::Assembly => &mut self.report.assembly_ns,
            TimingBucket::Solve => &mut self.report.solve_ns,
            TimingBucket::Relaxation => &mut self.report.relaxation_ns,
            TimingBucket::Writeback => &mut self.report.writeback_ns,
        };
        *slot = slot.saturating_add(nanos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_total() {
        let report = FairTimingReport {
            adjacency_ns: 1000,
            solve_ns: 2000,
            writeback_ns: 3000,
            ..Default::default()
        };
        assert_eq!(report.total_ns(), 6000);
        assert!((report.total_ms() - 0.006).abs() < 1e-9);
    }

    #[test]
    fn time_returns_closure_result() {
        let mut metrics = FairMetrics::default();
        metrics.begin();
        assert_eq!(metrics.time(TimingBucket::Solve, || 42), 42);
        let report = metrics.end();
        if cfg!(feature = "fair_metrics") {
            assert!(report.is_some());
        } else {
            assert!(report.is_none());
        }
    }
}
