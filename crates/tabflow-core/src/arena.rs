//! Bump allocator backing all batch storage.
//!
//! Every batch owns one [`Arena`]; column names and string cells are interned
//! into it and addressed by [`StrRef`] indexes rather than pointers, so a
//! string lives exactly as long as the arena that interned it and rows copied
//! across batches must re-intern their string cells into the destination.

/// Index of an interned string inside an [`Arena`].
///
/// A `StrRef` is only meaningful together with the arena that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrRef {
    block: u32,
    offset: u32,
    len: u32,
}

impl StrRef {
    /// The empty string; valid in any arena.
    pub const EMPTY: StrRef = StrRef {
        block: 0,
        offset: 0,
        len: 0,
    };

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump-allocated region with O(blocks) reset.
///
/// Allocation appends into the current block and opens a new block when the
/// remaining space is too small; blocks are never reallocated, so interned
/// bytes keep their position for the lifetime of the arena. Requests larger
/// than the block size get a dedicated block.
#[derive(Debug)]
pub struct Arena {
    block_size: usize,
    blocks: Vec<Vec<u8>>,
}

/// Alignment kept for every allocation start.
const ALIGN: usize = 8;

impl Arena {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(64);
        Self {
            block_size,
            blocks: vec![Vec::with_capacity(block_size)],
        }
    }

    /// Reserve `n` bytes and return the (block, offset) the caller may fill.
    fn reserve(&mut self, n: usize) -> (usize, usize) {
        let last = self.blocks.len() - 1;
        let used = self.blocks[last].len();
        let start = (used + ALIGN - 1) & !(ALIGN - 1);
        if start + n <= self.blocks[last].capacity() {
            self.blocks[last].resize(start, 0);
            return (last, start);
        }
        let cap = self.block_size.max(n);
        self.blocks.push(Vec::with_capacity(cap));
        (self.blocks.len() - 1, 0)
    }

    /// Copy `s` into the arena and return its index.
    pub fn intern(&mut self, s: &str) -> StrRef {
        if s.is_empty() {
            return StrRef::EMPTY;
        }
        let (block, offset) = self.reserve(s.len());
        self.blocks[block].extend_from_slice(s.as_bytes());
        StrRef {
            block: block as u32,
            offset: offset as u32,
            len: s.len() as u32,
        }
    }

    /// Resolve an index produced by this arena.
    ///
    /// A foreign or stale reference resolves to the empty string rather than
    /// aliasing unrelated bytes.
    pub fn get(&self, r: StrRef) -> &str {
        if r.len == 0 {
            return "";
        }
        let Some(block) = self.blocks.get(r.block as usize) else {
            return "";
        };
        let start = r.offset as usize;
        let end = start + r.len as usize;
        if end > block.len() {
            return "";
        }
        std::str::from_utf8(&block[start..end]).unwrap_or("")
    }

    /// Drop every allocation, keeping the first block for reuse.
    pub fn reset(&mut self) {
        self.blocks.truncate(1);
        self.blocks[0].clear();
    }

    /// Bytes currently allocated across all blocks.
    pub fn allocated(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_and_resolve() {
        let mut a = Arena::new(1024);
        let hello = a.intern("hello");
        let world = a.intern("world");
        assert_eq!(a.get(hello), "hello");
        assert_eq!(a.get(world), "world");
    }

    #[test]
    fn interned_strings_survive_block_growth() {
        let mut a = Arena::new(64);
        let refs: Vec<(StrRef, String)> = (0..200)
            .map(|i| {
                let s = format!("value-{i}");
                (a.intern(&s), s)
            })
            .collect();
        for (r, expected) in refs {
            assert_eq!(a.get(r), expected);
        }
        assert!(a.blocks.len() > 1);
    }

    #[test]
    fn oversized_allocation_gets_own_block() {
        let mut a = Arena::new(64);
        let big = "x".repeat(500);
        let r = a.intern(&big);
        assert_eq!(a.get(r), big);
    }

    #[test]
    fn reset_frees_everything() {
        let mut a = Arena::new(64);
        for i in 0..100 {
            a.intern(&format!("row {i}"));
        }
        a.reset();
        assert_eq!(a.allocated(), 0);
        let r = a.intern("fresh");
        assert_eq!(a.get(r), "fresh");
    }

    #[test]
    fn empty_string_is_shared() {
        let mut a = Arena::new(64);
        let r = a.intern("");
        assert_eq!(r, StrRef::EMPTY);
        assert_eq!(a.get(r), "");
    }
}
