// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{io::{Error, ErrorKind}, sync::{Arc, Mutex}};

use log::{error, info};
use rand::{distributions::WeightedIndex, prelude::*};
use rand_chacha::ChaCha20Rng;

use crate::{backend::{Backend, BackendCapabilities, Transaction, Value}, config::BankConfig, keygen::KeyGenerator, utils::{apply_parameter, parse_positive, retry_forever, AtomicStruct, ParameterTable, Setter}};

use super::{resolve_read_only, BankOperation, TransactionShape, TransactionWorkload, TransactionWorkloadFactory};

pub const WORLD_ACCOUNT: &str = "WORLD";

/// Everything a bank operation needs to know about the accounts.
/// Passed explicitly to every operation; there is no process-wide bank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BankContext {
    pub bucket: String,
    pub num_accounts: usize,
    pub initial_amount: i64,
}

impl BankContext {
    pub fn new(config: &BankConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            num_accounts: config.num_accounts,
            initial_amount: config.initial_amount,
        }
    }

    pub fn account_key(&self, account: usize) -> String {
        format!("account_{}", account)
    }

    /// Sum every check must observe: all accounts plus WORLD, each seeded with `initial_amount`.
    pub fn expected_total(&self) -> i64 {
        self.initial_amount * (self.num_accounts as i64 + 1)
    }

    /// Seeds every account and WORLD. Each put is retried until it succeeds.
    pub fn populate(&self, backend: &dyn Backend) -> u64 {
        let keys = (0..self.num_accounts)
            .map(|a| self.account_key(a))
            .chain(std::iter::once(WORLD_ACCOUNT.to_string()));
        let mut written = 0;
        for key in keys {
            retry_forever(&format!("Seeding {}/{}", self.bucket, key), || {
                backend.put(&self.bucket, &key, Value::Amount(self.initial_amount))
            });
            written += 1;
        }
        info!("Seeded {} bank accounts with {} each", written, self.initial_amount);
        written
    }

    fn balance(&self, txn: &mut dyn Transaction, key: &str) -> Result<i64, Error> {
        match txn.get(&self.bucket, key)? {
            Some(v) => v.as_amount()
                .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Account {} holds a non-amount value", key))),
            None => Err(Error::new(ErrorKind::NotFound, format!("Account {} does not exist", key))),
        }
    }

    fn move_funds(&self, txn: &mut dyn Transaction, from: &str, to: &str, amount: i64) -> Result<(), Error> {
        let from_balance = self.balance(txn, from)?;
        let to_balance = self.balance(txn, to)?;
        txn.put(&self.bucket, from, Value::Amount(from_balance - amount))?;
        // A self-transfer must net to zero.
        let to_balance = if from == to { from_balance - amount } else { to_balance };
        txn.put(&self.bucket, to, Value::Amount(to_balance + amount))
    }

    pub fn transfer(&self, txn: &mut dyn Transaction, from: usize, to: usize, amount: i64) -> Result<(), Error> {
        self.move_funds(txn, &self.account_key(from), &self.account_key(to), amount)
    }

    pub fn deposit(&self, txn: &mut dyn Transaction, account: usize, amount: i64) -> Result<(), Error> {
        self.move_funds(txn, WORLD_ACCOUNT, &self.account_key(account), amount)
    }

    pub fn withdraw(&self, txn: &mut dyn Transaction, account: usize, amount: i64) -> Result<(), Error> {
        self.move_funds(txn, &self.account_key(account), WORLD_ACCOUNT, amount)
    }

    /// Sum of every account plus WORLD, read in one transaction.
    pub fn check_all_accounts(&self, txn: &mut dyn Transaction) -> Result<i64, Error> {
        let mut total = self.balance(txn, WORLD_ACCOUNT)?;
        for a in 0..self.num_accounts {
            total += self.balance(txn, &self.account_key(a))?;
        }
        Ok(total)
    }
}

/// Parsed form of `BankConfig`.
#[derive(Clone, Debug)]
pub struct BankWorkload {
    pub ctx: BankContext,
    pub max_amount: i64,
    ops: [BankOperation; 4],
    dist: WeightedIndex<u32>,
}

impl BankWorkload {
    pub fn new(config: &BankConfig) -> Result<Self, Error> {
        if config.num_accounts == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Bank needs at least one account"));
        }
        if config.max_amount <= 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "max_amount must be > 0"));
        }
        let w = &config.weights;
        let ops = [BankOperation::Transfer, BankOperation::Deposit, BankOperation::Withdraw, BankOperation::CheckAllAccounts];
        let dist = WeightedIndex::new([w.transfer, w.deposit, w.withdraw, w.check_all_accounts])
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("Invalid bank weights: {}", e)))?;
        Ok(Self {
            ctx: BankContext::new(config),
            max_amount: config.max_amount,
            ops,
            dist,
        })
    }

    fn sample_op(&self, rng: &mut ChaCha20Rng) -> BankOperation {
        self.ops[self.dist.sample(rng)]
    }
}

fn set_weight(field: &mut u32, v: &str) -> bool {
    match v.trim().parse::<u32>() {
        Ok(w) => {
            *field = w;
            true
        },
        Err(_) => false,
    }
}

fn set_transfer_weight(c: &mut BankConfig, v: &str) -> bool {
    set_weight(&mut c.weights.transfer, v)
}

fn set_deposit_weight(c: &mut BankConfig, v: &str) -> bool {
    set_weight(&mut c.weights.deposit, v)
}

fn set_withdraw_weight(c: &mut BankConfig, v: &str) -> bool {
    set_weight(&mut c.weights.withdraw, v)
}

fn set_check_all_weight(c: &mut BankConfig, v: &str) -> bool {
    set_weight(&mut c.weights.check_all_accounts, v)
}

fn set_max_amount(c: &mut BankConfig, v: &str) -> bool {
    match parse_positive::<i64>(v) {
        Some(a) => {
            c.max_amount = a;
            true
        },
        None => false,
    }
}

const BANK_PARAMETERS: &ParameterTable<BankConfig> = &[
    ("transfer_weight", set_transfer_weight as Setter<BankConfig>),
    ("deposit_weight", set_deposit_weight),
    ("withdraw_weight", set_withdraw_weight),
    ("check_all_weight", set_check_all_weight),
    ("max_amount", set_max_amount),
];

/// Transfer / deposit / withdraw / check-all-accounts mix.
/// Money only moves, so every check-all-accounts must see `expected_total()`;
/// any other sum means the backend let a transaction observe a partial update.
pub struct BankWorkloadFactory {
    config: Mutex<BankConfig>,
    current: AtomicStruct<BankWorkload>,
}

impl BankWorkloadFactory {
    pub fn new(config: &BankConfig) -> Result<Self, Error> {
        let workload = BankWorkload::new(config)?;
        Ok(Self {
            config: Mutex::new(config.clone()),
            current: AtomicStruct::new(workload),
        })
    }

    pub fn current(&self) -> Arc<BankWorkload> {
        self.current.get()
    }
}

impl TransactionWorkloadFactory for BankWorkloadFactory {
    fn name(&self) -> &'static str {
        "bank"
    }

    fn choose_transaction(&self, rng: &mut ChaCha20Rng, caps: &BackendCapabilities) -> TransactionWorkload {
        let w = self.current.get();
        let mut op = w.sample_op(rng);
        let read_only = resolve_read_only(caps, op == BankOperation::CheckAllAccounts);
        if read_only {
            op = BankOperation::CheckAllAccounts;
        } else if op == BankOperation::CheckAllAccounts {
            op = BankOperation::Transfer;
        }

        let accounts = w.ctx.num_accounts;
        let from = rng.gen_range(0..accounts);
        let to = if accounts > 1 {
            (from + rng.gen_range(1..accounts)) % accounts
        } else {
            from
        };
        let amount = rng.gen_range(1..=w.max_amount);
        TransactionWorkload::new(read_only, TransactionShape::Bank { op, from, to, amount })
    }

    fn execute(
        &self,
        workload: &TransactionWorkload,
        txn: &mut dyn Transaction,
        _keygen: &mut KeyGenerator,
        _rng: &mut ChaCha20Rng,
    ) -> Result<(), Error> {
        let w = self.current.get();
        let ctx = &w.ctx;
        match workload.shape() {
            TransactionShape::Bank { op: BankOperation::Transfer, from, to, amount } => ctx.transfer(txn, from, to, amount),
            TransactionShape::Bank { op: BankOperation::Deposit, to, amount, .. } => ctx.deposit(txn, to, amount),
            TransactionShape::Bank { op: BankOperation::Withdraw, from, amount, .. } => ctx.withdraw(txn, from, amount),
            TransactionShape::Bank { op: BankOperation::CheckAllAccounts, .. } => {
                let total = ctx.check_all_accounts(txn)?;
                if total != ctx.expected_total() {
                    error!("Bank consistency violated: accounts sum to {}, expected {}. The backend broke isolation.",
                        total, ctx.expected_total());
                    return Err(Error::new(ErrorKind::InvalidData,
                        format!("Bank total {} != {}", total, ctx.expected_total())));
                }
                Ok(())
            },
            other => Err(Error::new(ErrorKind::InvalidInput, format!("Not a bank transaction: {:?}", other))),
        }
    }

    fn set_parameter(&self, name: &str, value: &str) -> Option<bool> {
        let ok = {
            let mut config = self.config.lock().ok()?;
            let mut candidate = config.clone();
            let applied = apply_parameter(BANK_PARAMETERS, &mut candidate, name, value)?;
            // All-zero weights would leave nothing to pick.
            let valid = applied && BankWorkload::new(&candidate).is_ok();
            if valid {
                *config = candidate;
            }
            valid
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
        if let Ok(w) = BankWorkload::new(&config) {
            self.current.set(w);
        }
    }
}
