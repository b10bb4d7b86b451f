// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{io::{Error, ErrorKind}, str::FromStr, sync::Arc, time::{Duration, Instant}};

use rand::Rng;
use rand_chacha::ChaCha20Rng;

use crate::{backend::{BackendCapabilities, Transaction}, config::RequestConfig, keygen::KeyGenerator};

mod synthetic;
pub use synthetic::*;

mod bank;
pub use bank::*;

#[cfg(test)]
mod tests;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BankOperation {
    Transfer,
    Deposit,
    Withdraw,
    CheckAllAccounts,
}

/// What one iteration will do. Decided by the factory, carried out by `execute`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionShape {
    Synthetic { reads: u32, writes: u32 },
    Bank { op: BankOperation, from: usize, to: usize, amount: i64 },
}

/// How a finished transaction ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    ExecutionFailed,
    CommitFailed,
    Committed,
}

/// One unit of work. Created per iteration, timed and mutated only by the thread running it.
#[derive(Clone, Debug)]
pub struct TransactionWorkload {
    read_only: bool,
    shape: TransactionShape,
    start_execution: Option<Instant>,
    end_execution: Option<Instant>,
    end_commit: Option<Instant>,
    execution_ok: bool,
    commit_ok: bool,
}

impl TransactionWorkload {
    pub fn new(read_only: bool, shape: TransactionShape) -> Self {
        Self {
            read_only,
            shape,
            start_execution: None,
            end_execution: None,
            end_commit: None,
            execution_ok: false,
            commit_ok: false,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn shape(&self) -> TransactionShape {
        self.shape
    }

    pub fn start_execution(&mut self) {
        self.start_execution = Some(Instant::now());
    }

    pub fn end_execution(&mut self, ok: bool) {
        self.end_execution = Some(Instant::now());
        self.execution_ok = ok;
    }

    pub fn end_commit(&mut self, ok: bool) {
        self.end_commit = Some(Instant::now());
        self.commit_ok = ok;
    }

    pub fn execution_duration(&self) -> Duration {
        match (self.start_execution, self.end_execution) {
            (Some(s), Some(e)) => e.saturating_duration_since(s),
            _ => Duration::ZERO,
        }
    }

    pub fn commit_duration(&self) -> Duration {
        match (self.end_execution, self.end_commit) {
            (Some(s), Some(e)) => e.saturating_duration_since(s),
            _ => Duration::ZERO,
        }
    }

    pub fn outcome(&self) -> TxOutcome {
        if !self.execution_ok {
            TxOutcome::ExecutionFailed
        } else if !self.commit_ok {
            TxOutcome::CommitFailed
        } else {
            TxOutcome::Committed
        }
    }
}

/// Decides what each iteration does and how it runs against a transaction.
/// Tunables live behind an atomically published snapshot: `choose_transaction`
/// and `execute` never lock, and may lag a concurrent update by one snapshot.
pub trait TransactionWorkloadFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn choose_transaction(&self, rng: &mut ChaCha20Rng, caps: &BackendCapabilities) -> TransactionWorkload;

    fn execute(
        &self,
        workload: &TransactionWorkload,
        txn: &mut dyn Transaction,
        keygen: &mut KeyGenerator,
        rng: &mut ChaCha20Rng,
    ) -> Result<(), Error>;

    /// `None` if the factory has no such parameter, `Some(false)` if the value was ignored.
    /// Accepted values are published right away.
    fn set_parameter(&self, name: &str, value: &str) -> Option<bool>;

    /// Rebuilds and publishes the current snapshot from the tunables.
    fn recompute(&self);
}

pub fn build_factory(config: &RequestConfig) -> Result<Arc<dyn TransactionWorkloadFactory>, Error> {
    Ok(match config {
        RequestConfig::Synthetic(c) => Arc::new(SyntheticWorkloadFactory::new(c)?),
        RequestConfig::Bank(c) => Arc::new(BankWorkloadFactory::new(c)?),
    })
}

/// Inclusive operation-count range, written `"min,max"` or as a single number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpRange {
    min: u32,
    max: u32,
}

impl OpRange {
    pub fn new(min: u32, max: u32) -> Result<Self, Error> {
        if min > max {
            return Err(Error::new(ErrorKind::InvalidInput, format!("Invalid range {},{}", min, max)));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min..=self.max)
    }
}

impl FromStr for OpRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| part.trim().parse::<u32>()
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("Bad range bound {:?}: {}", part, e)));

        match s.split_once(',') {
            Some((lo, hi)) => OpRange::new(parse(lo)?, parse(hi)?),
            None => {
                let n = parse(s)?;
                OpRange::new(n, n)
            }
        }
    }
}

/// Passive replication pins writes to the primary: the coordinator only writes,
/// every other node only reads. Otherwise the backend's capability flags, then `want_read_only`.
pub(crate) fn resolve_read_only(caps: &BackendCapabilities, want_read_only: bool) -> bool {
    if caps.passive_replication {
        return !caps.is_coordinator;
    }
    if !caps.can_write {
        return true;
    }
    if !caps.can_read_only {
        return false;
    }
    want_read_only
}
