// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

pub mod utils;
pub mod config;
pub mod keygen;
pub mod backend;
pub mod workload;
pub mod stressor;
pub mod stage;
pub mod coordinator;
