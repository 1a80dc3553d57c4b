//! Opaque allocation handles

/// Where a block's bytes live
pub(super) enum BlockKind {
    /// Slice of the arena region, valid for one generation
    Arena { offset: usize, generation: u32 },
    /// Heap fallback, owned by the handle
    Heap(Box<[u64]>),
}

/// Handle to one allocation
///
/// Resolve it through [`Arena::bytes_mut`](super::Arena::bytes_mut). Arena
/// blocks do not own their memory; heap fallback blocks do and free it when
/// dropped.
pub struct ArenaBlock {
    pub(super) kind: BlockKind,
    len: usize,
}

impl ArenaBlock {
    pub(super) fn new(kind: BlockKind, len: usize) -> Self {
        Self { kind, len }
    }

    /// Requested size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the arena was full and the heap served this request
    pub fn is_fallback(&self) -> bool {
        matches!(self.kind, BlockKind::Heap(_))
    }

    /// Offset inside the arena region, `None` for heap blocks
    pub fn offset(&self) -> Option<usize> {
        match self.kind {
            BlockKind::Arena { offset, .. } => Some(offset),
            BlockKind::Heap(_) => None,
        }
    }
}

impl std::fmt::Debug for ArenaBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            BlockKind::Arena { offset, generation } => f
                .debug_struct("ArenaBlock")
                .field("offset", offset)
                .field("generation", generation)
                .field("len", &self.len)
                .finish(),
            BlockKind::Heap(_) => f
                .debug_struct("ArenaBlock")
                .field("heap", &true)
                .field("len", &self.len)
                .finish(),
        }
    }
}
