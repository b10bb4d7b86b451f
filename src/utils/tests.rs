use std::{io::{Error, ErrorKind}, sync::{atomic::{AtomicBool, Ordering}, Arc}, thread};

use super::{retry_forever, AtomicStruct};

#[derive(Debug, Clone, PartialEq)]
struct Pair {
    a: u64,
    b: u64,
}

#[test]
fn test_atomic_struct_set_get() {
    let s = AtomicStruct::new(Pair { a: 1, b: 1 });
    assert_eq!(*s.get(), Pair { a: 1, b: 1 });

    let old = s.get();
    s.set(Pair { a: 2, b: 2 });
    assert_eq!(*s.get(), Pair { a: 2, b: 2 });

    // Readers holding the old snapshot keep it intact.
    assert_eq!(*old, Pair { a: 1, b: 1 });

    let clone = s.clone();
    clone.set(Pair { a: 3, b: 3 });
    assert_eq!(s.get().a, 3);
}

#[test]
fn test_atomic_struct_no_torn_reads() {
    let s = AtomicStruct::new(Pair { a: 0, b: 0 });
    let done = Arc::new(AtomicBool::new(false));

    let readers = (0..4).map(|_| {
        let s = s.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut reads = 0u64;
            while !done.load(Ordering::Acquire) {
                let snap = s.get();
                assert_eq!(snap.a, snap.b, "Torn snapshot");
                reads += 1;
            }
            reads
        })
    }).collect::<Vec<_>>();

    for i in 1..5000 {
        s.set(Pair { a: i, b: i });
    }
    done.store(true, Ordering::Release);

    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(s.get().a, 4999);
}

#[test]
fn test_retry_forever_eventually_succeeds() {
    let mut failures_left = 5;
    let v = retry_forever("flaky op", || {
        if failures_left > 0 {
            failures_left -= 1;
            Err(Error::new(ErrorKind::Other, "transient"))
        } else {
            Ok(42)
        }
    });
    assert_eq!(v, 42);
    assert_eq!(failures_left, 0);
}

struct Knobs {
    threads: usize,
    pct: u32,
}

fn set_threads(k: &mut Knobs, v: &str) -> bool {
    match super::parse_positive::<usize>(v) {
        Some(t) => {
            k.threads = t;
            true
        },
        None => false,
    }
}

fn set_pct(k: &mut Knobs, v: &str) -> bool {
    match super::parse_percentage(v) {
        Some(p) => {
            k.pct = p;
            true
        },
        None => false,
    }
}

const KNOBS: &super::ParameterTable<Knobs> = &[
    ("threads", set_threads as super::Setter<Knobs>),
    ("pct", set_pct),
];

#[test]
fn test_parameter_table_ignores_invalid_values() {
    let mut k = Knobs { threads: 4, pct: 10 };
    assert_eq!(super::apply_parameter(KNOBS, &mut k, "threads", "8"), Some(true));
    assert_eq!(k.threads, 8);
    assert_eq!(super::apply_parameter(KNOBS, &mut k, "threads", "0"), Some(false));
    assert_eq!(super::apply_parameter(KNOBS, &mut k, "threads", "-3"), Some(false));
    assert_eq!(k.threads, 8);
    assert_eq!(super::apply_parameter(KNOBS, &mut k, "pct", "101"), Some(false));
    assert_eq!(super::apply_parameter(KNOBS, &mut k, "pct", "100"), Some(true));
    assert_eq!(k.pct, 100);
    assert_eq!(super::apply_parameter(KNOBS, &mut k, "unknown", "1"), None);
}
