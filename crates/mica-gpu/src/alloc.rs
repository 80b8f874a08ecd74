use hashbrown::HashMap;
use thiserror::Error;

use crate::format::Tiling;

/// Opaque handle to a memory-manager allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("out of device memory ({requested} bytes requested)")]
    OutOfMemory { requested: u64 },
}

/// The memory-manager collaborator.
///
/// The consistency core never touches allocation contents; it only needs
/// handles it can attach to surfaces and return when the last reference to a
/// surface goes away.
pub trait MemoryPool {
    fn allocate(&mut self, size_bytes: u64, tiling: Tiling) -> Result<MemHandle, AllocError>;

    /// Return an allocation. Releasing a handle this pool did not hand out
    /// (or releasing one twice) is caller misuse.
    fn release(&mut self, handle: MemHandle);
}

impl<T: MemoryPool + ?Sized> MemoryPool for &mut T {
    fn allocate(&mut self, size_bytes: u64, tiling: Tiling) -> Result<MemHandle, AllocError> {
        (**self).allocate(size_bytes, tiling)
    }

    fn release(&mut self, handle: MemHandle) {
        (**self).release(handle);
    }
}

impl<T: MemoryPool + ?Sized> MemoryPool for Box<T> {
    fn allocate(&mut self, size_bytes: u64, tiling: Tiling) -> Result<MemHandle, AllocError> {
        (**self).allocate(size_bytes, tiling)
    }

    fn release(&mut self, handle: MemHandle) {
        (**self).release(handle);
    }
}

/// A bookkeeping-only pool: tracks live allocations and an optional byte
/// budget, backed by nothing. The default pool for tests and for callers
/// without a real memory manager.
#[derive(Debug, Default)]
pub struct SystemPool {
    budget_bytes: Option<u64>,
    used_bytes: u64,
    next_handle: u64,
    live: HashMap<MemHandle, u64>,
    released: u64,
}

impl SystemPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool that fails allocations once `budget_bytes` are outstanding.
    pub fn with_budget(budget_bytes: u64) -> Self {
        Self {
            budget_bytes: Some(budget_bytes),
            ..Self::default()
        }
    }

    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Number of allocations returned so far.
    pub fn released_count(&self) -> u64 {
        self.released
    }
}

impl MemoryPool for SystemPool {
    fn allocate(&mut self, size_bytes: u64, _tiling: Tiling) -> Result<MemHandle, AllocError> {
        if let Some(budget) = self.budget_bytes {
            if self.used_bytes + size_bytes > budget {
                return Err(AllocError::OutOfMemory {
                    requested: size_bytes,
                });
            }
        }
        self.next_handle += 1;
        let handle = MemHandle(self.next_handle);
        self.live.insert(handle, size_bytes);
        self.used_bytes += size_bytes;
        Ok(handle)
    }

    fn release(&mut self, handle: MemHandle) {
        let size = self.live.remove(&handle);
        debug_assert!(size.is_some(), "release of unknown handle {handle:?}");
        if let Some(size) = size {
            self.used_bytes -= size;
            self.released += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budgeted_pool_rejects_over_budget_allocations() {
        let mut pool = SystemPool::with_budget(1024);
        let a = pool.allocate(512, Tiling::Linear).unwrap();
        assert_eq!(
            pool.allocate(1024, Tiling::Linear),
            Err(AllocError::OutOfMemory { requested: 1024 })
        );
        pool.release(a);
        assert!(pool.allocate(1024, Tiling::Linear).is_ok());
    }

    #[test]
    fn release_returns_bytes_to_the_budget() {
        let mut pool = SystemPool::new();
        let a = pool.allocate(100, Tiling::TiledX).unwrap();
        let b = pool.allocate(200, Tiling::TiledY).unwrap();
        assert_eq!(pool.used_bytes(), 300);
        assert_eq!(pool.live_allocations(), 2);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.used_bytes(), 0);
        assert_eq!(pool.live_allocations(), 0);
        assert_eq!(pool.released_count(), 2);
    }
}
