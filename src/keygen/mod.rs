// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

//! Deterministic slicing of the key space across (node, thread) pairs,
//! and the per-thread generators that draw keys and values from it.

mod partitioner;
pub use partitioner::*;

mod generator;
pub use generator::*;
