// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::time::Duration;

use indexmap::IndexMap;

use crate::workload::{TransactionWorkload, TxOutcome};

/// Flat metrics map handed back by a stress run. Key names are stable; downstream tooling greps for them.
pub type Report = IndexMap<String, String>;

/// Total wall time of the run, summed over threads and divided by the thread count. Milliseconds.
pub const DURATION: &str = "DURATION";
/// Committed transactions per second.
pub const THROUGHPUT: &str = "THROUGHPUT";
pub const NUM_THREADS: &str = "NUM_THREADS";
pub const TOTAL_FAILURES: &str = "TOTAL_FAILURES";

pub const READ_ONLY_TX_COUNT: &str = "READ_ONLY_TX_COUNT";
pub const WRITE_TX_COUNT: &str = "WRITE_TX_COUNT";
pub const READ_ONLY_TX_EXEC_FAILED: &str = "READ_ONLY_TX_EXEC_FAILED";
pub const WRITE_TX_EXEC_FAILED: &str = "WRITE_TX_EXEC_FAILED";
pub const READ_ONLY_TX_COMMIT_FAILED: &str = "READ_ONLY_TX_COMMIT_FAILED";
pub const WRITE_TX_COMMIT_FAILED: &str = "WRITE_TX_COMMIT_FAILED";

// Averages are in microseconds.
pub const AVG_READ_ONLY_TX_DURATION: &str = "AVG_READ_ONLY_TX_DURATION";
pub const AVG_WRITE_TX_DURATION: &str = "AVG_WRITE_TX_DURATION";
pub const AVG_READ_ONLY_COMMIT_DURATION: &str = "AVG_READ_ONLY_COMMIT_DURATION";
pub const AVG_WRITE_COMMIT_DURATION: &str = "AVG_WRITE_COMMIT_DURATION";
pub const AVG_READ_ONLY_EXEC_FAILED_DURATION: &str = "AVG_READ_ONLY_EXEC_FAILED_DURATION";
pub const AVG_WRITE_EXEC_FAILED_DURATION: &str = "AVG_WRITE_EXEC_FAILED_DURATION";
pub const AVG_READ_ONLY_COMMIT_FAILED_DURATION: &str = "AVG_READ_ONLY_COMMIT_FAILED_DURATION";
pub const AVG_WRITE_COMMIT_FAILED_DURATION: &str = "AVG_WRITE_COMMIT_FAILED_DURATION";

/// Count and summed durations of one outcome bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutcomeStat {
    pub count: u64,
    pub exec_time: Duration,
    pub commit_time: Duration,
}

impl OutcomeStat {
    fn add(&mut self, exec: Duration, commit: Duration) {
        self.count += 1;
        self.exec_time += exec;
        self.commit_time += commit;
    }

    fn merge(&mut self, other: &OutcomeStat) {
        self.count += other.count;
        self.exec_time += other.exec_time;
        self.commit_time += other.commit_time;
    }

    fn avg(total: Duration, count: u64) -> Duration {
        if count > 0 {
            total.div_f64(count as f64)
        } else {
            Duration::ZERO
        }
    }

    pub fn avg_exec_time(&self) -> Duration {
        Self::avg(self.exec_time, self.count)
    }

    pub fn avg_commit_time(&self) -> Duration {
        Self::avg(self.commit_time, self.count)
    }

    /// Execution plus commit.
    pub fn avg_total_time(&self) -> Duration {
        Self::avg(self.exec_time + self.commit_time, self.count)
    }
}

/// The three outcome buckets of one transaction class (read-only or write).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClassStats {
    pub exec_failed: OutcomeStat,
    pub commit_failed: OutcomeStat,
    pub committed: OutcomeStat,
}

impl ClassStats {
    fn bucket_mut(&mut self, outcome: TxOutcome) -> &mut OutcomeStat {
        match outcome {
            TxOutcome::ExecutionFailed => &mut self.exec_failed,
            TxOutcome::CommitFailed => &mut self.commit_failed,
            TxOutcome::Committed => &mut self.committed,
        }
    }

    fn merge(&mut self, other: &ClassStats) {
        self.exec_failed.merge(&other.exec_failed);
        self.commit_failed.merge(&other.commit_failed);
        self.committed.merge(&other.committed);
    }

    pub fn failures(&self) -> u64 {
        self.exec_failed.count + self.commit_failed.count
    }
}

/// Accumulator owned by one worker thread, merged by the controlling thread after join.
/// Merging is plain summation, so the join order never changes the totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThreadStats {
    pub read_only: ClassStats,
    pub write: ClassStats,
    /// Wall time the thread spent in its loop. Summed on merge.
    pub duration: Duration,
    /// Number of threads folded into this value.
    pub threads: usize,
}

impl ThreadStats {
    pub fn new() -> Self {
        Self { threads: 1, ..Default::default() }
    }

    pub fn record(&mut self, tx: &TransactionWorkload) {
        let class = if tx.is_read_only() { &mut self.read_only } else { &mut self.write };
        class.bucket_mut(tx.outcome()).add(tx.execution_duration(), tx.commit_duration());
    }

    pub fn merge(&mut self, other: &ThreadStats) {
        self.read_only.merge(&other.read_only);
        self.write.merge(&other.write);
        self.duration += other.duration;
        self.threads += other.threads;
    }

    pub fn committed(&self) -> u64 {
        self.read_only.committed.count + self.write.committed.count
    }

    pub fn failures(&self) -> u64 {
        self.read_only.failures() + self.write.failures()
    }

    /// Mean wall time per thread.
    pub fn avg_duration(&self) -> Duration {
        if self.threads > 0 {
            self.duration / self.threads as u32
        } else {
            Duration::ZERO
        }
    }

    /// Committed transactions per second of mean per-thread wall time. 0 for an empty run.
    pub fn throughput(&self) -> f64 {
        let secs = self.avg_duration().as_secs_f64();
        if secs > 0.0 {
            self.committed() as f64 / secs
        } else {
            0.0
        }
    }

    /// Renders the merged statistics, followed by `extra` (backend supplied numbers).
    pub fn report(&self, extra: IndexMap<String, String>) -> Report {
        let mut report = Report::new();
        let mut put = |k: &str, v: String| {
            report.insert(k.to_string(), v);
        };
        let micros = |d: Duration| d.as_micros().to_string();

        put(DURATION, self.avg_duration().as_millis().to_string());
        put(THROUGHPUT, format!("{:.2}", self.throughput()));
        put(NUM_THREADS, self.threads.to_string());
        put(TOTAL_FAILURES, self.failures().to_string());

        put(READ_ONLY_TX_COUNT, self.read_only.committed.count.to_string());
        put(WRITE_TX_COUNT, self.write.committed.count.to_string());
        put(READ_ONLY_TX_EXEC_FAILED, self.read_only.exec_failed.count.to_string());
        put(WRITE_TX_EXEC_FAILED, self.write.exec_failed.count.to_string());
        put(READ_ONLY_TX_COMMIT_FAILED, self.read_only.commit_failed.count.to_string());
        put(WRITE_TX_COMMIT_FAILED, self.write.commit_failed.count.to_string());

        put(AVG_READ_ONLY_TX_DURATION, micros(self.read_only.committed.avg_total_time()));
        put(AVG_WRITE_TX_DURATION, micros(self.write.committed.avg_total_time()));
        put(AVG_READ_ONLY_COMMIT_DURATION, micros(self.read_only.committed.avg_commit_time()));
        put(AVG_WRITE_COMMIT_DURATION, micros(self.write.committed.avg_commit_time()));
        put(AVG_READ_ONLY_EXEC_FAILED_DURATION, micros(self.read_only.exec_failed.avg_exec_time()));
        put(AVG_WRITE_EXEC_FAILED_DURATION, micros(self.write.exec_failed.avg_exec_time()));
        put(AVG_READ_ONLY_COMMIT_FAILED_DURATION, micros(self.read_only.commit_failed.avg_total_time()));
        put(AVG_WRITE_COMMIT_FAILED_DURATION, micros(self.write.commit_failed.avg_total_time()));

        for (k, v) in extra {
            report.insert(k, v);
        }
        report
    }
}
