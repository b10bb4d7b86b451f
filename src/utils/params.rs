// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::str::FromStr;

use log::{info, warn};

/// Typed setter for one named tunable. Returns false, leaving `target` untouched,
/// when the value does not parse or is out of range.
pub type Setter<C> = fn(&mut C, &str) -> bool;

pub type ParameterTable<C> = [(&'static str, Setter<C>)];

/// Looks `name` up in `table` and applies `value`.
/// `None`: unknown name. `Some(false)`: known, but the value was rejected and the old one kept.
pub fn apply_parameter<C>(table: &ParameterTable<C>, target: &mut C, name: &str, value: &str) -> Option<bool> {
    let (_, setter) = table.iter().find(|(n, _)| *n == name)?;
    let ok = setter(target, value);
    if ok {
        info!("Parameter {} set to {}", name, value);
    } else {
        warn!("Ignoring invalid value {:?} for parameter {}", value, name);
    }
    Some(ok)
}

/// Parses a strictly positive number.
pub fn parse_positive<T: FromStr + PartialOrd + Default>(value: &str) -> Option<T> {
    value.trim().parse::<T>().ok().filter(|v| *v > T::default())
}

/// Parses a percentage in `[0, 100]`.
pub fn parse_percentage(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|v| *v <= 100)
}
