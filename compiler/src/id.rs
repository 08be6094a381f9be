// id.rs — Stable node identifiers for the lowering passes
//
// These IDs give deterministic, position-independent identity to input-tree
// nodes so pass outputs can live in side tables instead of being written onto
// the nodes themselves. Allocated in source order by the upstream tree
// builder; threaded through access classification, subset mapping, kernel
// emission, and graph assembly.

use serde::Serialize;

/// Stable identifier for a computation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId(pub u32);

/// Stable identifier for a field or scalar reference site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RefId(pub u32);

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation (source) order, ensuring deterministic assignment.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_block: u32,
    next_ref: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn alloc_ref(&mut self) -> RefId {
        let id = RefId(self.next_ref);
        self.next_ref += 1;
        id
    }
}
