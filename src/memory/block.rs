use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use log::trace;

use crate::error::{Error, Result};

/// Largest alignment any built-in type asks for.
pub const MAX_ALIGNMENT: usize = 16;

/// Runs against the start of a heap block just before it is freed.
pub type Finalizer = Box<dyn FnOnce(*mut u8) + Send>;

/// Runs when the last reference to an external block goes away.
pub type Release = Box<dyn FnOnce() + Send>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BlockKind {
    Heap,
    External,
    Arena,
}

enum Storage {
    Heap {
        ptr: NonNull<u8>,
        layout: Layout,
        finalizer: Option<Finalizer>,
    },
    External {
        ptr: *mut u8,
        len: usize,
        release: Option<Release>,
    },
    Arena(Mutex<Vec<(NonNull<u8>, Layout)>>),
}

struct BlockData {
    storage: Storage,
}

// Buffers are only reached through raw pointers. Callers uphold the
// single-mutator-per-region contract.
unsafe impl Send for BlockData {}
unsafe impl Sync for BlockData {}

impl Drop for BlockData {
    fn drop(&mut self) {
        match &mut self.storage {
            Storage::Heap {
                ptr,
                layout,
                finalizer,
            } => {
                if let Some(finalize) = finalizer.take() {
                    finalize(ptr.as_ptr());
                }
                trace!("freeing heap block of {} bytes", layout.size());
                unsafe { alloc::dealloc(ptr.as_ptr(), *layout) };
            }
            Storage::External { len, release, .. } => {
                trace!("releasing external block of {len} bytes");
                if let Some(release) = release.take() {
                    release();
                }
            }
            Storage::Arena(chunks) => {
                let chunks = match chunks.get_mut() {
                    Ok(chunks) => chunks,
                    Err(poisoned) => poisoned.into_inner(),
                };
                trace!("freeing arena block with {} chunks", chunks.len());
                for (ptr, layout) in chunks.drain(..) {
                    unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
                }
            }
        }
    }
}

/// Memory Block
///
/// A reference counted owner of raw bytes. Cloning a block acquires a new
/// reference to the same buffer and dropping one releases it; the buffer is
/// freed (or handed back through its release callback) exactly when the
/// last reference goes away. A block never moves its bytes, so pointers
/// into it stay valid for as long as any reference is held.
///
#[derive(Clone)]
pub struct MemoryBlock(Arc<BlockData>);

impl MemoryBlock {
    /// Allocate a zero-filled heap buffer.
    pub fn heap(size: usize, align: usize) -> Result<MemoryBlock> {
        MemoryBlock::heap_inner(size, align, None)
    }

    /// Allocate a zero-filled heap buffer whose contents need tearing down
    /// (for example foreign object slots) before the bytes are freed.
    pub fn heap_with_finalizer(
        size: usize,
        align: usize,
        finalizer: Finalizer,
    ) -> Result<MemoryBlock> {
        MemoryBlock::heap_inner(size, align, Some(finalizer))
    }

    fn heap_inner(size: usize, align: usize, finalizer: Option<Finalizer>) -> Result<MemoryBlock> {
        let layout = Layout::from_size_align(size.max(1), align.max(1))
            .map_err(|_| Error::AllocationFailed(Some(size)))?;
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .ok_or(Error::AllocationFailed(Some(size)))?;
        trace!("allocated heap block of {size} bytes (align {align})");
        Ok(MemoryBlock(Arc::new(BlockData {
            storage: Storage::Heap {
                ptr,
                layout,
                finalizer,
            },
        })))
    }

    /// Wrap memory owned by someone else.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes until
    /// `release` is called, which happens when the last reference to the
    /// returned block is dropped.
    pub unsafe fn external<F>(ptr: *mut u8, len: usize, release: F) -> MemoryBlock
    where
        F: FnOnce() + Send + 'static,
    {
        trace!("wrapping external block of {len} bytes");
        MemoryBlock(Arc::new(BlockData {
            storage: Storage::External {
                ptr,
                len,
                release: Some(Box::new(release)),
            },
        }))
    }

    /// Wrap a byte vector, keeping it alive for as long as the block.
    pub fn from_vec(bytes: Vec<u8>) -> MemoryBlock {
        let mut bytes = bytes.into_boxed_slice();
        let len = bytes.len();
        let ptr = bytes.as_mut_ptr();
        // the boxed slice never moves its heap allocation, and it is only
        // dropped by the release callback
        unsafe { MemoryBlock::external(ptr, len, move || drop(bytes)) }
    }

    /// Create an empty arena for variable-sized payloads. Chunks handed out
    /// by [`MemoryBlock::arena_alloc`] are never moved or reused.
    pub fn arena() -> MemoryBlock {
        MemoryBlock(Arc::new(BlockData {
            storage: Storage::Arena(Mutex::new(Vec::new())),
        }))
    }

    /// Allocate a zero-filled chunk inside an arena block.
    pub fn arena_alloc(&self, size: usize, align: usize) -> Result<*mut u8> {
        let Storage::Arena(chunks) = &self.0.storage else {
            return crate::internal_err!("arena_alloc called on a non-arena memory block");
        };
        let layout = Layout::from_size_align(size.max(1), align.max(1))
            .map_err(|_| Error::AllocationFailed(Some(size)))?;
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .ok_or(Error::AllocationFailed(Some(size)))?;
        let mut chunks = match chunks.lock() {
            Ok(chunks) => chunks,
            Err(poisoned) => poisoned.into_inner(),
        };
        chunks.push((ptr, layout));
        Ok(ptr.as_ptr())
    }

    /// Acquire another reference to the same buffer.
    pub fn acquire(&self) -> MemoryBlock {
        self.clone()
    }

    /// Release this reference.
    pub fn release(self) {
        drop(self)
    }

    /// Number of live references to the buffer.
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn kind(&self) -> BlockKind {
        match self.0.storage {
            Storage::Heap { .. } => BlockKind::Heap,
            Storage::External { .. } => BlockKind::External,
            Storage::Arena(_) => BlockKind::Arena,
        }
    }

    /// Start of the buffer. Arenas have no single buffer and return null.
    pub fn data(&self) -> *mut u8 {
        match &self.0.storage {
            Storage::Heap { ptr, .. } => ptr.as_ptr(),
            Storage::External { ptr, .. } => *ptr,
            Storage::Arena(_) => std::ptr::null_mut(),
        }
    }

    /// Size of the buffer in bytes. Arenas report the bytes handed out.
    pub fn len(&self) -> usize {
        match &self.0.storage {
            Storage::Heap { layout, .. } => layout.size(),
            Storage::External { len, .. } => *len,
            Storage::Arena(chunks) => match chunks.lock() {
                Ok(chunks) => chunks.iter().map(|(_, l)| l.size()).sum(),
                Err(poisoned) => poisoned.into_inner().iter().map(|(_, l)| l.size()).sum(),
            },
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &MemoryBlock) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether `ptr` falls inside this block's buffer.
    pub fn contains(&self, ptr: *const u8) -> bool {
        match &self.0.storage {
            Storage::Arena(chunks) => {
                let chunks = match chunks.lock() {
                    Ok(chunks) => chunks,
                    Err(poisoned) => poisoned.into_inner(),
                };
                chunks.iter().any(|(p, l)| {
                    let start = p.as_ptr() as usize;
                    (start..start + l.size()).contains(&(ptr as usize))
                })
            }
            _ => {
                let start = self.data() as usize;
                (start..=start + self.len()).contains(&(ptr as usize))
            }
        }
    }
}

impl PartialEq for MemoryBlock {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn heap_is_zero_filled() {
        let block = MemoryBlock::heap(64, 8).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(block.data(), 64) };
        assert!(bytes.iter().all(|b| *b == 0));
        assert_eq!(block.kind(), BlockKind::Heap);
    }

    #[test]
    fn acquire_and_release_track_references() {
        let block = MemoryBlock::heap(8, 8).unwrap();
        let other = block.acquire();
        assert_eq!(block.use_count(), 2);
        assert!(block.ptr_eq(&other));
        other.release();
        assert_eq!(block.use_count(), 1);
    }

    #[test]
    fn external_release_runs_once_at_last_reference() {
        static RELEASED: AtomicUsize = AtomicUsize::new(0);
        let mut buffer = vec![1u8, 2, 3, 4];
        let block = unsafe {
            MemoryBlock::external(buffer.as_mut_ptr(), buffer.len(), || {
                RELEASED.fetch_add(1, Ordering::SeqCst);
            })
        };
        let second = block.acquire();
        drop(block);
        assert_eq!(RELEASED.load(Ordering::SeqCst), 0);
        drop(second);
        assert_eq!(RELEASED.load(Ordering::SeqCst), 1);
        assert_eq!(buffer[0], 1);
    }

    #[test]
    fn finalizer_sees_contents_before_free() {
        static SEEN: AtomicUsize = AtomicUsize::new(0);
        let block = MemoryBlock::heap_with_finalizer(
            4,
            4,
            Box::new(|ptr| {
                let v = unsafe { *ptr };
                SEEN.store(v as usize, Ordering::SeqCst);
            }),
        )
        .unwrap();
        unsafe { *block.data() = 42 };
        drop(block);
        assert_eq!(SEEN.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn arena_chunks_are_stable() {
        let arena = MemoryBlock::arena();
        let a = arena.arena_alloc(16, 8).unwrap();
        unsafe { *a = 7 };
        for _ in 0..32 {
            arena.arena_alloc(64, 8).unwrap();
        }
        assert_eq!(unsafe { *a }, 7);
        assert!(arena.contains(a));
        assert!(arena.data().is_null());
    }

    #[test]
    fn arena_alloc_on_heap_block_is_internal_error() {
        let block = MemoryBlock::heap(8, 8).unwrap();
        assert!(matches!(block.arena_alloc(4, 4), Err(Error::Internal(..))));
    }

    #[test]
    fn from_vec_keeps_bytes() {
        let block = MemoryBlock::from_vec(vec![9, 8, 7]);
        assert_eq!(block.len(), 3);
        assert_eq!(unsafe { *block.data().add(2) }, 7);
    }

    #[test]
    fn references_cross_threads() {
        let block = MemoryBlock::heap(8, 8).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let b = block.acquire();
                std::thread::spawn(move || b.use_count() >= 1)
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(block.use_count(), 1);
    }
}
