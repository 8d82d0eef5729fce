//! Engine-addressable memory for bound strings and blobs.

use crate::error::{Error, Result};
use rusqlite::ffi;
use std::ffi::c_void;
use std::ptr::NonNull;

/// Allocation counters of an [`Arena`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Allocations made over the arena's lifetime.
    pub allocated: u64,
    /// Allocations released over the arena's lifetime.
    pub released: u64,
}

impl ArenaStats {
    /// Allocations currently live.
    #[must_use]
    pub const fn live(&self) -> u64 {
        self.allocated - self.released
    }
}

/// Owns memory handed to the engine for the duration of one bind cycle.
///
/// Memory comes from the engine's allocator so the engine may read it
/// directly (parameters are bound with the static destructor). Every
/// allocation is released exactly once: by [`Arena::release_all`] or on drop.
#[derive(Debug, Default)]
pub struct Arena {
    live: Vec<NonNull<u8>>,
    stats: ArenaStats,
}

impl Arena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` into engine memory and returns its address.
    ///
    /// An empty slice still gets a one-byte allocation so the engine sees a
    /// non-null pointer.
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> Result<NonNull<u8>> {
        let ptr = self.alloc(bytes.len().max(1))?;
        // SAFETY: `ptr` points to at least `bytes.len()` fresh bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
        }
        Ok(ptr)
    }

    /// Copies `text` plus a trailing NUL into engine memory.
    pub fn alloc_str(&mut self, text: &str) -> Result<NonNull<u8>> {
        let len = text.len();
        let ptr = self.alloc(len + 1)?;
        // SAFETY: `ptr` points to `len + 1` fresh bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(text.as_ptr(), ptr.as_ptr(), len);
            *ptr.as_ptr().add(len) = 0;
        }
        Ok(ptr)
    }

    fn alloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        // SAFETY: plain allocation; a null result is handled below.
        let raw = unsafe { ffi::sqlite3_malloc64(size as u64) };
        let ptr = NonNull::new(raw.cast::<u8>()).ok_or(Error::OutOfMemory { requested: size })?;
        self.live.push(ptr);
        self.stats.allocated += 1;
        Ok(ptr)
    }

    /// Frees every live allocation and returns how many were freed.
    pub fn release_all(&mut self) -> usize {
        let count = self.live.len();
        for ptr in self.live.drain(..) {
            // SAFETY: each pointer came from `sqlite3_malloc64` and is
            // removed from the list as it is freed.
            unsafe { ffi::sqlite3_free(ptr.as_ptr().cast::<c_void>()) };
        }
        self.stats.released += count as u64;
        count
    }

    /// Number of live allocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if nothing is allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Lifetime counters.
    #[must_use]
    pub const fn stats(&self) -> ArenaStats {
        self.stats
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.release_all();
    }
}
