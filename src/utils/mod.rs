// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::io;

use log::warn;

mod atomic_struct;
pub use atomic_struct::*;

mod params;
pub use params::*;

#[cfg(test)]
mod tests;

const RETRY_LOG_INTERVAL: u64 = 1000;

/// Runs `op` until it succeeds, with no backoff and no attempt cap.
/// Every `RETRY_LOG_INTERVAL`th consecutive failure is logged.
pub fn retry_forever<T, F>(what: &str, mut op: F) -> T
where
    F: FnMut() -> io::Result<T>,
{
    let mut attempts = 0u64;
    loop {
        match op() {
            Ok(v) => return v,
            Err(e) => {
                attempts += 1;
                if attempts == 1 || attempts % RETRY_LOG_INTERVAL == 0 {
                    warn!("{} failed (attempt {}): {}. Retrying.", what, attempts, e);
                }
            }
        }
    }
}
