//! Bump arena over a reserved memory region
//!
//! Decoder sessions allocate their scratch state here instead of the general
//! heap. The arena hands out 8-byte aligned slices of one fixed region by
//! advancing a cursor; nothing is freed individually. When a request does not
//! fit, it is served from the heap instead and the arena cursor is left
//! untouched, so allocation never fails from the caller's point of view.
//!
//! # Lifecycle
//!
//! ```ignore
//! let mut arena = Arena::new(32 * 1024);
//!
//! // Session start: reclaim everything from the previous session
//! arena.reset();
//! let mut scratch = arena.allocate(4608);
//!
//! // Resolve the handle whenever the bytes are needed
//! let bytes = arena.bytes_mut(&mut scratch).expect("issued this session");
//! ```
//!
//! Handles carry the generation they were issued in. After `reset()` a stale
//! handle resolves to `None` rather than aliasing memory that now belongs to
//! the next session.

mod block;

pub use block::ArenaBlock;

use block::BlockKind;

/// Allocation granularity and alignment in bytes
pub const ARENA_ALIGN: usize = 8;

/// Default arena size: one 32KB reserved SRAM bank
pub const DEFAULT_ARENA_CAPACITY: usize = 32 * 1024;

/// Round a request up to the arena alignment
#[inline]
pub fn align_up(size: usize) -> usize {
    size.div_ceil(ARENA_ALIGN) * ARENA_ALIGN
}

/// Fixed-capacity bump allocator with heap fallback
pub struct Arena {
    /// Backing region (u64 words keep the base 8-byte aligned)
    region: Box<[u64]>,
    /// Offset of the next free byte
    cursor: usize,
    /// Bumped on every reset to invalidate outstanding handles
    generation: u32,
    /// Requests served from the heap since the last reset
    fallback_count: usize,
    /// Bytes served from the heap since the last reset
    fallback_bytes: usize,
}

impl Arena {
    /// Reserve a region of `capacity` bytes (rounded up to the alignment)
    pub fn new(capacity: usize) -> Self {
        let words = align_up(capacity) / ARENA_ALIGN;
        Self::from_region(vec![0u64; words].into_boxed_slice())
    }

    /// Use an existing region as the arena
    pub fn from_region(region: Box<[u64]>) -> Self {
        Self {
            region,
            cursor: 0,
            generation: 0,
            fallback_count: 0,
            fallback_bytes: 0,
        }
    }

    /// Allocate `size` bytes
    ///
    /// The request is rounded up to [`ARENA_ALIGN`]. If the rounded size
    /// exceeds the remaining capacity, the block comes from the heap and the
    /// arena bookkeeping is unchanged.
    pub fn allocate(&mut self, size: usize) -> ArenaBlock {
        let rounded = align_up(size);

        if rounded <= self.remaining() {
            let offset = self.cursor;
            self.cursor += rounded;
            ArenaBlock::new(
                BlockKind::Arena {
                    offset,
                    generation: self.generation,
                },
                size,
            )
        } else {
            self.fallback_count += 1;
            self.fallback_bytes += rounded;
            log::debug!(
                "Arena exhausted ({} of {} bytes free), {} byte request served from heap",
                self.remaining(),
                self.capacity(),
                size
            );
            let words = vec![0u64; rounded / ARENA_ALIGN].into_boxed_slice();
            ArenaBlock::new(BlockKind::Heap(words), size)
        }
    }

    /// Reclaim the whole region
    ///
    /// Every handle issued before this call becomes stale.
    pub fn reset(&mut self) {
        if self.fallback_count > 0 {
            log::info!(
                "Arena reset: previous session used {} of {} bytes, {} heap fallbacks ({} bytes)",
                self.cursor,
                self.capacity(),
                self.fallback_count,
                self.fallback_bytes
            );
        }
        self.cursor = 0;
        self.generation = self.generation.wrapping_add(1);
        self.fallback_count = 0;
        self.fallback_bytes = 0;
    }

    /// Resolve a block to its bytes
    ///
    /// Returns `None` for an arena block issued before the last reset.
    pub fn bytes_mut<'a>(&'a mut self, block: &'a mut ArenaBlock) -> Option<&'a mut [u8]> {
        let len = block.len();
        match &mut block.kind {
            BlockKind::Arena { offset, generation } => {
                if *generation != self.generation {
                    return None;
                }
                let region: &mut [u8] = bytemuck::cast_slice_mut(&mut self.region[..]);
                Some(&mut region[*offset..*offset + len])
            }
            BlockKind::Heap(words) => {
                let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words[..]);
                Some(&mut bytes[..len])
            }
        }
    }

    /// Whether a block can still be resolved
    pub fn is_live(&self, block: &ArenaBlock) -> bool {
        match &block.kind {
            BlockKind::Arena { generation, .. } => *generation == self.generation,
            BlockKind::Heap(_) => true,
        }
    }

    /// Total region size in bytes
    pub fn capacity(&self) -> usize {
        self.region.len() * ARENA_ALIGN
    }

    /// Bytes still available in the region
    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    /// Bytes handed out from the region since the last reset
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Heap fallbacks since the last reset
    pub fn fallback_count(&self) -> usize {
        self.fallback_count
    }

    /// Address of the first byte of the region
    pub fn base_addr(&self) -> usize {
        self.region.as_ptr() as usize
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(DEFAULT_ARENA_CAPACITY)
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("used", &self.cursor)
            .field("generation", &self.generation)
            .field("fallback_count", &self.fallback_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 8);
        assert_eq!(align_up(8), 8);
        assert_eq!(align_up(10), 16);
        assert_eq!(align_up(20), 24);
    }

    #[test]
    fn test_small_region_then_fallback() {
        let mut arena = Arena::new(64);

        let blocks: Vec<_> = (0..3).map(|_| arena.allocate(10)).collect();
        assert!(blocks.iter().all(|b| !b.is_fallback()));
        assert_eq!(arena.used(), 48);
        assert_eq!(arena.remaining(), 16);

        // 20 rounds to 24, more than the 16 left
        let mut big = arena.allocate(20);
        assert!(big.is_fallback());
        assert_eq!(big.len(), 20);
        assert_eq!(arena.used(), 48);
        assert_eq!(arena.remaining(), 16);
        assert_eq!(arena.fallback_count(), 1);
        assert_eq!(arena.bytes_mut(&mut big).map(|b| b.len()), Some(20));
    }

    #[test]
    fn test_blocks_in_region_aligned_and_disjoint() {
        let mut arena = Arena::new(1024);
        let sizes = [1, 7, 8, 9, 100, 3, 64, 250, 31];
        let mut ranges = Vec::new();

        for size in sizes {
            let block = arena.allocate(size);
            let offset = block.offset().expect("fits in the region");
            assert_eq!(offset % ARENA_ALIGN, 0);
            assert_eq!((arena.base_addr() + offset) % ARENA_ALIGN, 0);
            assert!(offset + size <= arena.capacity());
            ranges.push(offset..offset + size);
        }

        for (i, a) in ranges.iter().enumerate() {
            for b in ranges.iter().skip(i + 1) {
                assert!(a.end <= b.start || b.end <= a.start, "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_exact_fit_stays_in_region() {
        let mut arena = Arena::new(32);
        assert!(!arena.allocate(32).is_fallback());
        assert_eq!(arena.remaining(), 0);
        assert!(arena.allocate(1).is_fallback());
    }

    #[test]
    fn test_reset_invalidates_handles() {
        let mut arena = Arena::new(64);
        let mut old = arena.allocate(16);
        arena.bytes_mut(&mut old).unwrap().fill(0xAB);

        arena.reset();
        assert_eq!(arena.used(), 0);
        assert!(!arena.is_live(&old));
        assert!(arena.bytes_mut(&mut old).is_none());

        let mut fresh = arena.allocate(16);
        assert_eq!(fresh.offset(), Some(0));
        assert!(arena.bytes_mut(&mut fresh).is_some());
    }

    #[test]
    fn test_heap_blocks_survive_reset() {
        let mut arena = Arena::new(8);
        let mut heap = arena.allocate(100);
        arena.reset();
        assert!(arena.is_live(&heap));
        let bytes = arena.bytes_mut(&mut heap).unwrap();
        bytes[99] = 1;
        assert_eq!(bytes.len(), 100);
    }

    #[test]
    fn test_writes_do_not_bleed_between_blocks() {
        let mut arena = Arena::new(64);
        let mut a = arena.allocate(10);
        let mut b = arena.allocate(10);
        arena.bytes_mut(&mut a).unwrap().fill(1);
        arena.bytes_mut(&mut b).unwrap().fill(2);
        assert!(arena.bytes_mut(&mut a).unwrap().iter().all(|&x| x == 1));
        assert!(arena.bytes_mut(&mut b).unwrap().iter().all(|&x| x == 2));
    }
}
