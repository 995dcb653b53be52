//! Memory budget: how wide a contraction the machine can afford.
//!
//! Peak memory of a contraction of treewidth `tw` is modeled as `16 * 2^tw`
//! bytes (one complex double per amplitude), so a budget of `avail` bytes
//! allows `tw = log2(avail) - 4`.

use sysinfo::System;
use std::io;

use crate::elimination::Width;
use crate::error::Result;

/// Bytes per amplitude.
pub const BYTES_PER_AMPLITUDE: u64 = 16;

/// Source of the number of bytes a contraction may use.
pub trait MemoryBudget {
    fn available_bytes(&self) -> Result<u64>;
}

impl<T: MemoryBudget + ?Sized> MemoryBudget for &T {
    fn available_bytes(&self) -> Result<u64> {
        (**self).available_bytes()
    }
}

impl<T: MemoryBudget + ?Sized> MemoryBudget for Box<T> {
    fn available_bytes(&self) -> Result<u64> {
        (**self).available_bytes()
    }
}

/// Memory currently available on this machine, as reported by the
/// operating system.
///
/// The reading is a snapshot; other processes may take the memory before
/// the contraction runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemMemory;

impl MemoryBudget for SystemMemory {
    fn available_bytes(&self) -> Result<u64> {
        let mut system = System::new();
        system.refresh_memory();
        if system.total_memory() == 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "system memory cannot be queried on this platform",
            )
            .into());
        }
        Ok(system.available_memory())
    }
}

/// A fixed number of bytes, for reproducible runs and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedMemory(pub u64);

impl MemoryBudget for FixedMemory {
    fn available_bytes(&self) -> Result<u64> {
        Ok(self.0)
    }
}

/// Largest treewidth whose contraction fits into `available` bytes, before
/// any bias is applied. No memory at all yields -5.
pub fn max_treewidth(available: u64) -> i64 {
    let log2 = available.checked_ilog2().map_or(-1, i64::from);
    log2 - BYTES_PER_AMPLITUDE.ilog2() as i64
}

/// Bytes needed for a contraction of the given treewidth.
pub fn peak_memory_bytes(treewidth: Width) -> f64 {
    BYTES_PER_AMPLITUDE as f64 * 2f64.powi(treewidth as i32)
}

/// Smallest number of bytes for which `max_treewidth` reaches `tw`. Handy
/// for picking a [`FixedMemory`] that targets a given width.
pub fn bytes_for_treewidth(tw: u32) -> u64 {
    BYTES_PER_AMPLITUDE << tw
}
