// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{io::{Error, ErrorKind}, sync::Mutex};

use log::trace;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;

use crate::{backend::{BackendCapabilities, Transaction, Value}, config::SyntheticConfig, keygen::KeyGenerator, utils::{apply_parameter, parse_percentage, AtomicStruct, ParameterTable, Setter}};

use super::{resolve_read_only, OpRange, TransactionShape, TransactionWorkload, TransactionWorkloadFactory};

/// Parsed form of `SyntheticConfig`.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticWorkload {
    pub write_tx_percentage: u32,
    pub read_only_tx_reads: OpRange,
    pub write_tx_reads: OpRange,
    pub write_tx_writes: OpRange,
}

impl SyntheticWorkload {
    pub fn new(config: &SyntheticConfig) -> Result<Self, Error> {
        if config.write_tx_percentage > 100 {
            return Err(Error::new(ErrorKind::InvalidInput, "write_tx_percentage must be <= 100"));
        }
        let write_tx_writes: OpRange = config.write_tx_writes.parse()?;
        if write_tx_writes.min() == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "A write transaction needs at least one write"));
        }
        Ok(Self {
            write_tx_percentage: config.write_tx_percentage,
            read_only_tx_reads: config.read_only_tx_reads.parse()?,
            write_tx_reads: config.write_tx_reads.parse()?,
            write_tx_writes,
        })
    }
}

fn set_write_tx_percentage(c: &mut SyntheticConfig, v: &str) -> bool {
    match parse_percentage(v) {
        Some(p) => {
            c.write_tx_percentage = p;
            true
        },
        None => false,
    }
}

fn set_range(field: &mut String, v: &str, min_ops: u32) -> bool {
    match v.parse::<OpRange>() {
        Ok(r) if r.min() >= min_ops => {
            *field = v.trim().to_string();
            true
        },
        _ => false,
    }
}

fn set_read_only_tx_reads(c: &mut SyntheticConfig, v: &str) -> bool {
    set_range(&mut c.read_only_tx_reads, v, 0)
}

fn set_write_tx_reads(c: &mut SyntheticConfig, v: &str) -> bool {
    set_range(&mut c.write_tx_reads, v, 0)
}

fn set_write_tx_writes(c: &mut SyntheticConfig, v: &str) -> bool {
    set_range(&mut c.write_tx_writes, v, 1)
}

const SYNTHETIC_PARAMETERS: &ParameterTable<SyntheticConfig> = &[
    ("write_tx_percentage", set_write_tx_percentage as Setter<SyntheticConfig>),
    ("read_only_tx_reads", set_read_only_tx_reads),
    ("write_tx_reads", set_write_tx_reads),
    ("write_tx_writes", set_write_tx_writes),
];

/// Read-only transactions issue only gets; write transactions mix gets and puts.
/// Puts in one transaction always target distinct keys.
pub struct SyntheticWorkloadFactory {
    config: Mutex<SyntheticConfig>,
    current: AtomicStruct<SyntheticWorkload>,
}

impl SyntheticWorkloadFactory {
    pub fn new(config: &SyntheticConfig) -> Result<Self, Error> {
        let workload = SyntheticWorkload::new(config)?;
        Ok(Self {
            config: Mutex::new(config.clone()),
            current: AtomicStruct::new(workload),
        })
    }

    pub fn current(&self) -> std::sync::Arc<SyntheticWorkload> {
        self.current.get()
    }
}

impl TransactionWorkloadFactory for SyntheticWorkloadFactory {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn choose_transaction(&self, rng: &mut ChaCha20Rng, caps: &BackendCapabilities) -> TransactionWorkload {
        let w = self.current.get();
        let want_read_only = rng.gen_range(0..100) >= w.write_tx_percentage;
        let read_only = resolve_read_only(caps, want_read_only);

        let shape = if read_only {
            TransactionShape::Synthetic { reads: w.read_only_tx_reads.sample(rng), writes: 0 }
        } else {
            TransactionShape::Synthetic {
                reads: w.write_tx_reads.sample(rng),
                writes: w.write_tx_writes.sample(rng),
            }
        };
        TransactionWorkload::new(read_only, shape)
    }

    fn execute(
        &self,
        workload: &TransactionWorkload,
        txn: &mut dyn Transaction,
        keygen: &mut KeyGenerator,
        rng: &mut ChaCha20Rng,
    ) -> Result<(), Error> {
        let (reads, writes) = match workload.shape() {
            TransactionShape::Synthetic { reads, writes } => (reads, writes),
            other => return Err(Error::new(ErrorKind::InvalidInput, format!("Not a synthetic transaction: {:?}", other))),
        };

        let mut write_keys = keygen.unique_random_keys(writes as usize).into_iter();
        let mut reads_left = reads;
        let mut writes_left = write_keys.len() as u32;

        while reads_left + writes_left > 0 {
            if rng.gen_range(0..reads_left + writes_left) < reads_left {
                let key = keygen.random_key()
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, "Key space is empty"))?;
                let _ = txn.get(&keygen.bucket_of(&key), &key.key())?;
                reads_left -= 1;
            } else {
                if let Some(key) = write_keys.next() {
                    let value = Value::Text(keygen.random_value());
                    txn.put(&keygen.bucket_of(&key), &key.key(), value)?;
                }
                writes_left -= 1;
            }
        }
        trace!("Executed synthetic tx with {} reads, {} writes", reads, writes);
        Ok(())
    }

    fn set_parameter(&self, name: &str, value: &str) -> Option<bool> {
        let ok = {
            let mut config = self.config.lock().ok()?;
            apply_parameter(SYNTHETIC_PARAMETERS, &mut config, name, value)?
        };
        if ok {
            self.recompute();
        }
        Some(ok)
    }

    fn recompute(&self) {
        let config = match self.config.lock() {
            Ok(c) => c.clone(),
            Err(_) => return,
        };
        // Setters only store parseable values, so this cannot fail.
        if let Ok(w) = SyntheticWorkload::new(&config) {
            self.current.set(w);
        }
    }
}
