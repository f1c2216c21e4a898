//! Main-loop throughput counter.

use log::info;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateReport {
    pub loops: u64,
    pub elapsed_us: u64,
    pub loops_per_second: u64,
}

#[derive(Debug)]
pub struct LoopStatistics {
    period_us: u64,
    deadline_us: u64,
    count: u64,
}

impl LoopStatistics {
    pub fn begin(period_ms: u64, now_us: u64) -> Self {
        let period_us = period_ms.saturating_mul(1_000).max(1);
        Self {
            period_us,
            deadline_us: now_us.saturating_add(period_us),
            count: 0,
        }
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    /// Counts one loop iteration and reports once the armed deadline has passed.
    ///
    /// The next deadline is the previous one plus the period, so reporting
    /// latency does not shift the window.
    pub fn tick(&mut self, now_us: u64) -> Option<RateReport> {
        self.count += 1;
        if self.deadline_us >= now_us {
            return None;
        }

        let window_start = self.deadline_us - self.period_us;
        let elapsed_us = (now_us - window_start).max(1);
        let report = RateReport {
            loops: self.count,
            elapsed_us,
            loops_per_second: self.count.saturating_mul(1_000_000) / elapsed_us,
        };

        info!(
            "[STATISTIC] {} loops in {}us ({} loops/s)",
            report.loops, report.elapsed_us, report.loops_per_second
        );

        self.count = 0;
        self.deadline_us += self.period_us;
        Some(report)
    }
}
