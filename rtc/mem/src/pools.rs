//! Fixed-block event pools

use crate::QPoolStats;
use core::cell::{RefCell, UnsafeCell};
use core::sync::atomic::{AtomicU8, Ordering};
use critical_section::{CriticalSection, Mutex};
use rtc_core::{Margin, QError, QResult};

const NIL: u16 = u16::MAX;

/// Object-safe view of an event pool, used by the pool table and by
/// [`QEvt`](crate::QEvt) to return blocks.
///
/// Every method that touches bookkeeping takes a [`CriticalSection`] token,
/// so reference counts and the free list can only change inside one.
pub trait EventPool: Sync {
    /// Payload capacity of one block in bytes
    fn block_size(&self) -> usize;

    /// Number of blocks
    fn capacity(&self) -> usize;

    /// Index in the pool table (`1..=MAX_EPOOL`), 0 while unregistered
    fn pool_id(&self) -> u8;

    /// Record the index assigned at registration
    fn set_pool_id(&self, id: u8);

    /// Take a free block, copy `payload` into it and set its count to 1.
    ///
    /// Fails with [`QError::OutOfMemory`] when `margin` rejects the request
    /// and with [`QError::PoolExhausted`] when an unconditional request finds
    /// the pool empty.
    fn alloc(&self, margin: Margin, payload: &[u8], cs: CriticalSection<'_>) -> QResult<u16>;

    /// Add one reference to a live block.
    ///
    /// Fails with [`QError::RefCountOverflow`] when the count is already at
    /// its maximum; the count is left unchanged.
    fn retain(&self, block: u16, cs: CriticalSection<'_>) -> QResult<()>;

    /// Drop one reference; returns `true` when the block went back to the
    /// free list.
    fn release(&self, block: u16, cs: CriticalSection<'_>) -> bool;

    /// Current reference count of a block
    fn ref_count(&self, block: u16, cs: CriticalSection<'_>) -> u8;

    /// Usage statistics
    fn stats(&self, cs: CriticalSection<'_>) -> QPoolStats;

    /// Payload bytes of a block.
    ///
    /// # Safety
    ///
    /// The caller must hold a reference to `block` (count > 0) for as long as
    /// the returned slice lives, and `len` must not exceed `block_size()`.
    unsafe fn payload(&self, block: u16, len: usize) -> &[u8];
}

struct Block<const B: usize>(UnsafeCell<[u8; B]>);

impl<const B: usize> Block<B> {
    const EMPTY: Self = Block(UnsafeCell::new([0; B]));
}

struct PoolState<const N: usize> {
    head: u16,
    next: [u16; N],
    refs: [u8; N],
    stats: QPoolStats,
}

impl<const N: usize> PoolState<N> {
    const fn new() -> Self {
        let mut next = [NIL; N];
        let mut i = 0;
        while i + 1 < N {
            next[i] = (i + 1) as u16;
            i += 1;
        }
        Self {
            head: if N == 0 { NIL } else { 0 },
            next,
            refs: [0; N],
            stats: QPoolStats::new(N),
        }
    }
}

/// Pool of `N` blocks, each holding up to `B` payload bytes.
///
/// Meant to live in a `static`:
///
/// ```
/// use rtc_mem::{EventPool, QMPool};
///
/// static SMALL: QMPool<8, 16> = QMPool::new();
/// assert_eq!(SMALL.block_size(), 8);
/// ```
pub struct QMPool<const B: usize, const N: usize> {
    blocks: [Block<B>; N],
    state: Mutex<RefCell<PoolState<N>>>,
    id: AtomicU8,
}

// SAFETY: block contents are written only by `alloc`, while the block is off
// the free list and before any `QEvt` refers to it. Afterwards they are only
// read, through handles that keep the reference count above zero, so a block
// is never written while a shared view of it exists. All other state sits
// behind the critical-section mutex.
unsafe impl<const B: usize, const N: usize> Sync for QMPool<B, N> {}

impl<const B: usize, const N: usize> QMPool<B, N> {
    const FITS: () = assert!(N < NIL as usize, "pool too large for 16-bit block indices");

    /// Create a pool with every block free
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::FITS;
        Self {
            blocks: [Block::EMPTY; N],
            state: Mutex::new(RefCell::new(PoolState::new())),
            id: AtomicU8::new(0),
        }
    }

    /// Number of free blocks
    pub fn n_free(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).stats.free_blocks)
    }

    /// Lowest number of free blocks ever observed
    pub fn n_min(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).stats.min_free_blocks)
    }
}

impl<const B: usize, const N: usize> Default for QMPool<B, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const B: usize, const N: usize> EventPool for QMPool<B, N> {
    fn block_size(&self) -> usize {
        B
    }

    fn capacity(&self) -> usize {
        N
    }

    fn pool_id(&self) -> u8 {
        self.id.load(Ordering::Relaxed)
    }

    fn set_pool_id(&self, id: u8) {
        self.id.store(id, Ordering::Relaxed);
    }

    fn alloc(&self, margin: Margin, payload: &[u8], cs: CriticalSection<'_>) -> QResult<u16> {
        if payload.len() > B {
            return Err(QError::InvalidSize);
        }

        let mut state = self.state.borrow_ref_mut(cs);
        match margin.admits(state.stats.free_blocks as u16) {
            Some(true) => {}
            Some(false) => return Err(QError::OutOfMemory),
            None => return Err(QError::PoolExhausted),
        }

        let block = state.head;
        let index = block as usize;
        state.head = state.next[index];
        state.next[index] = NIL;
        state.refs[index] = 1;
        state.stats.on_alloc();

        // SAFETY: the block was just unlinked from the free list, so no
        // handle refers to it and nobody else can be reading it.
        let data = unsafe { &mut *self.blocks[index].0.get() };
        data[..payload.len()].copy_from_slice(payload);

        Ok(block)
    }

    fn retain(&self, block: u16, cs: CriticalSection<'_>) -> QResult<()> {
        let mut state = self.state.borrow_ref_mut(cs);
        let refs = &mut state.refs[block as usize];
        debug_assert!(*refs > 0, "retain on a free block");
        *refs = refs.checked_add(1).ok_or(QError::RefCountOverflow)?;
        Ok(())
    }

    fn release(&self, block: u16, cs: CriticalSection<'_>) -> bool {
        let mut state = self.state.borrow_ref_mut(cs);
        let index = block as usize;
        debug_assert!(state.refs[index] > 0, "event reference count underflow");
        state.refs[index] = state.refs[index].saturating_sub(1);
        if state.refs[index] != 0 {
            return false;
        }

        state.next[index] = state.head;
        state.head = block;
        state.stats.on_dealloc();
        true
    }

    fn ref_count(&self, block: u16, cs: CriticalSection<'_>) -> u8 {
        self.state.borrow_ref(cs).refs[block as usize]
    }

    fn stats(&self, cs: CriticalSection<'_>) -> QPoolStats {
        self.state.borrow_ref(cs).stats
    }

    unsafe fn payload(&self, block: u16, len: usize) -> &[u8] {
        let data = &*self.blocks[block as usize].0.get();
        &data[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats() {
        let mut stats = QPoolStats::new(10);

        assert_eq!(stats.total_blocks, 10);
        assert_eq!(stats.free_blocks, 10);
        assert_eq!(stats.used_blocks, 0);
        assert_eq!(stats.min_free_blocks, 10);

        stats.on_alloc();
        assert_eq!(stats.free_blocks, 9);
        assert_eq!(stats.used_blocks, 1);
        assert_eq!(stats.min_free_blocks, 9);

        stats.on_dealloc();
        assert_eq!(stats.free_blocks, 10);
        assert_eq!(stats.used_blocks, 0);
        assert_eq!(stats.min_free_blocks, 9);
    }

    #[test]
    fn alloc_respects_margin() {
        static POOL: QMPool<4, 2> = QMPool::new();

        let a = critical_section::with(|cs| POOL.alloc(Margin::Keep(1), &[1], cs));
        assert_eq!(a, Ok(0));
        let b = critical_section::with(|cs| POOL.alloc(Margin::Keep(1), &[2], cs));
        assert_eq!(b, Err(QError::OutOfMemory));
        let c = critical_section::with(|cs| POOL.alloc(Margin::Keep(0), &[3], cs));
        assert_eq!(c, Ok(1));
        let d = critical_section::with(|cs| POOL.alloc(Margin::Unconditional, &[4], cs));
        assert_eq!(d, Err(QError::PoolExhausted));
    }

    #[test]
    fn release_returns_block_only_at_zero() {
        static POOL: QMPool<4, 1> = QMPool::new();

        critical_section::with(|cs| {
            let block = POOL.alloc(Margin::Unconditional, &[9, 9], cs).unwrap();
            POOL.retain(block, cs).unwrap();
            assert_eq!(POOL.ref_count(block, cs), 2);
            assert!(!POOL.release(block, cs));
            assert_eq!(POOL.stats(cs).free_blocks, 0);
            assert!(POOL.release(block, cs));
            assert_eq!(POOL.stats(cs).free_blocks, 1);
            assert_eq!(POOL.stats(cs).min_free_blocks, 0);
        });
    }

    #[test]
    fn retain_stops_at_max_count() {
        static POOL: QMPool<4, 1> = QMPool::new();

        critical_section::with(|cs| {
            let block = POOL.alloc(Margin::Unconditional, &[], cs).unwrap();
            for _ in 1..u8::MAX {
                POOL.retain(block, cs).unwrap();
            }
            assert_eq!(POOL.ref_count(block, cs), u8::MAX);

            assert_eq!(POOL.retain(block, cs), Err(QError::RefCountOverflow));
            assert_eq!(POOL.ref_count(block, cs), u8::MAX);
            assert!(!POOL.release(block, cs));
            assert_eq!(POOL.ref_count(block, cs), u8::MAX - 1);
        });
    }

    #[test]
    fn oversized_payload_is_rejected() {
        static POOL: QMPool<2, 1> = QMPool::new();
        let res = critical_section::with(|cs| POOL.alloc(Margin::Unconditional, &[0; 3], cs));
        assert_eq!(res, Err(QError::InvalidSize));
        assert_eq!(POOL.n_free(), 1);
    }
}
