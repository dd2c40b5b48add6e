//! Swaps real atomics for `loom`'s instrumented ones under `--cfg loom`.
//!
//! Every lock-free component (`list`, `table`, `array`, `node`) reaches for
//! its atomic types through this module instead of `std::sync::atomic`
//! directly, so the whole crate can be re-checked under loom's exhaustive
//! interleaving search without duplicating the algorithms.

macro_rules! spread_attr {
    (
        #[$cfg:meta]
        $($i:item)*
    ) => {
        $(
            #[$cfg]
            $i
        )*
    };
}

spread_attr! {
#[cfg(not(loom))]

pub(crate) use core::sync::atomic::{AtomicBool, AtomicI64, AtomicIsize, AtomicPtr, AtomicUsize};
pub(crate) use std::sync::Arc;
}

spread_attr! {
#[cfg(loom)]

pub(crate) use loom::sync::atomic::{AtomicBool, AtomicI64, AtomicIsize, AtomicPtr, AtomicUsize};
pub(crate) use loom::sync::Arc;
}
