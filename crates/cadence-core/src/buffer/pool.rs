//! Memory pools backing ring-buffer storage.
//!
//! The firmware allocates buffer control blocks and sample storage from zoned
//! heaps with capability flags (DMA-capable, low-power, ...). [`MemoryPool`] is
//! that seam: it accounts bytes per capability class and may refuse a request,
//! which surfaces as [`Error::OutOfMemory`](crate::Error::OutOfMemory). The
//! bytes themselves live in ordinary `Vec<u8>` storage owned by the buffer.

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Capability flags describing which heap a buffer is carved from.
///
/// # Example
///
/// ```rust
/// use cadence_core::MemCaps;
///
/// let caps = MemCaps::RAM.union(MemCaps::DMA);
/// assert!(caps.contains(MemCaps::DMA));
/// assert!(!caps.contains(MemCaps::LP));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemCaps(u32);

impl MemCaps {
    /// No capability requirement.
    pub const NONE: Self = Self(0);
    /// General purpose RAM.
    pub const RAM: Self = Self(1 << 0);
    /// Reachable by DMA engines.
    pub const DMA: Self = Self(1 << 1);
    /// Low-power memory.
    pub const LP: Self = Self(1 << 2);
    /// High-performance memory.
    pub const HP: Self = Self(1 << 3);
    /// Cacheable memory.
    pub const CACHE: Self = Self(1 << 4);

    /// Every named flag with its lowercase name, in bit order.
    pub const NAMED: [(&'static str, Self); 5] = [
        ("ram", Self::RAM),
        ("dma", Self::DMA),
        ("lp", Self::LP),
        ("hp", Self::HP),
        ("cache", Self::CACHE),
    ];

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Raw bit representation.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Looks up a single flag by its lowercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, caps)| caps)
    }
}

impl Default for MemCaps {
    fn default() -> Self {
        Self::RAM
    }
}

/// Byte accounting for a zoned heap.
///
/// Implementations must be cheap and non-blocking; they are called from
/// buffer allocation and resize paths, never from the copy path.
pub trait MemoryPool: Send + Sync {
    /// Reserves `bytes` from the heap matching `caps`.
    fn reserve(&self, caps: MemCaps, bytes: usize) -> Result<()>;

    /// Returns `bytes` previously reserved with the same `caps`.
    fn release(&self, caps: MemCaps, bytes: usize);

    /// Grows or shrinks a reservation in place.
    ///
    /// Shrinking always succeeds. Growing fails with
    /// [`Error::OutOfMemory`] and leaves the old reservation untouched.
    fn resize(&self, caps: MemCaps, old: usize, new: usize) -> Result<()> {
        if new <= old {
            self.release(caps, old - new);
            Ok(())
        } else {
            self.reserve(caps, new - old)
        }
    }
}

/// Pool that never refuses a request.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnboundedPool;

impl MemoryPool for UnboundedPool {
    fn reserve(&self, _caps: MemCaps, _bytes: usize) -> Result<()> {
        Ok(())
    }

    fn release(&self, _caps: MemCaps, _bytes: usize) {}
}

#[derive(Debug)]
struct Zone {
    caps: MemCaps,
    capacity: usize,
    used: usize,
}

/// Heap with fixed per-capability byte budgets.
///
/// A request is served by the first zone whose capabilities cover the
/// requested ones and which still has room. Requests no zone covers fail
/// with [`Error::OutOfMemory`].
#[derive(Debug, Default)]
pub struct HeapPool {
    zones: Mutex<Vec<Zone>>,
}

impl HeapPool {
    /// Creates an empty pool. Add budgets with [`with_zone`](Self::with_zone).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zone of `capacity` bytes offering `caps`.
    pub fn with_zone(self, caps: MemCaps, capacity: usize) -> Self {
        self.zones.lock().push(Zone {
            caps,
            capacity,
            used: 0,
        });
        self
    }

    /// Bytes currently reserved across all zones.
    pub fn used(&self) -> usize {
        self.zones.lock().iter().map(|z| z.used).sum()
    }

    /// Bytes still available in zones covering `caps`.
    pub fn available(&self, caps: MemCaps) -> usize {
        self.zones
            .lock()
            .iter()
            .filter(|z| z.caps.contains(caps))
            .map(|z| z.capacity - z.used)
            .sum()
    }
}

impl MemoryPool for HeapPool {
    fn reserve(&self, caps: MemCaps, bytes: usize) -> Result<()> {
        let mut zones = self.zones.lock();
        let zone = zones
            .iter_mut()
            .find(|z| z.caps.contains(caps) && z.capacity - z.used >= bytes)
            .ok_or(Error::OutOfMemory)?;
        zone.used += bytes;
        Ok(())
    }

    fn release(&self, caps: MemCaps, bytes: usize) {
        let mut zones = self.zones.lock();
        let mut remaining = bytes;
        for zone in zones.iter_mut().filter(|z| z.caps.contains(caps)) {
            let take = remaining.min(zone.used);
            zone.used -= take;
            remaining -= take;
            if remaining == 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_lookup_by_name() {
        assert_eq!(MemCaps::from_name("dma"), Some(MemCaps::DMA));
        assert_eq!(MemCaps::from_name("HP"), Some(MemCaps::HP));
        assert_eq!(MemCaps::from_name("sram"), None);
    }

    #[test]
    fn heap_pool_enforces_budget() {
        let pool = HeapPool::new().with_zone(MemCaps::RAM, 100);
        pool.reserve(MemCaps::RAM, 60).unwrap();
        assert_eq!(pool.reserve(MemCaps::RAM, 60), Err(Error::OutOfMemory));
        pool.release(MemCaps::RAM, 60);
        assert!(pool.reserve(MemCaps::RAM, 100).is_ok());
    }

    #[test]
    fn heap_pool_matches_capabilities() {
        let pool = HeapPool::new()
            .with_zone(MemCaps::RAM, 64)
            .with_zone(MemCaps::RAM.union(MemCaps::DMA), 32);
        assert_eq!(pool.reserve(MemCaps::DMA, 64), Err(Error::OutOfMemory));
        pool.reserve(MemCaps::DMA, 32).unwrap();
        assert_eq!(pool.available(MemCaps::DMA), 0);
        assert_eq!(pool.available(MemCaps::RAM), 64);
    }

    #[test]
    fn resize_shrink_always_succeeds() {
        let pool = HeapPool::new().with_zone(MemCaps::RAM, 10);
        pool.reserve(MemCaps::RAM, 10).unwrap();
        pool.resize(MemCaps::RAM, 10, 4).unwrap();
        assert_eq!(pool.used(), 4);
        assert_eq!(pool.resize(MemCaps::RAM, 4, 20), Err(Error::OutOfMemory));
        assert_eq!(pool.used(), 4);
    }
}
