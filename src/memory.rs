// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! DMA memory subsystem.
//!
//! Buffers handed to the accelerator must live in memory the device can
//! reach by physical address. On QAT this memory comes from the `usdm`
//! allocator, which must be initialized before the first allocation and
//! destroyed only after the last buffer is gone.
//!
//! [`MemoryPool`] tracks the allocator state and the number of live
//! [`DmaBuffer`]s. A buffer keeps the pool alive, so a request that is still
//! held by the driver (for example after a timed-out wait) blocks teardown
//! until it is dropped.

use crate::driver::Driver;
use crate::error::{QatError, QatResult};
use crate::status::Status;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// State of the DMA allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryState {
    /// `init` has not been called yet.
    Uninitialized,
    /// Allocations are possible.
    Ready,
    /// The allocator was torn down and cannot be reinitialized.
    Destroyed,
}

/// DMA-capable memory allocator shared by all buffers of a context.
pub struct MemoryPool {
    driver: Arc<dyn Driver>,
    state: Mutex<MemoryState>,
    live: AtomicUsize,
}

impl MemoryPool {
    pub(crate) fn new(driver: Arc<dyn Driver>) -> Arc<Self> {
        Arc::new(Self {
            driver,
            state: Mutex::new(MemoryState::Uninitialized),
            live: AtomicUsize::new(0),
        })
    }

    /// Current allocator state.
    pub fn state(&self) -> MemoryState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of buffers that have not been dropped yet.
    pub fn live_buffers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Prepare the allocator.
    ///
    /// # Errors
    ///
    /// Returns [`QatError::ResourceInit`] if the driver fails, or with
    /// [`Status::Fail`] if the pool is already initialized or was destroyed.
    pub(crate) fn init(&self) -> QatResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != MemoryState::Uninitialized {
            log::error!("memory subsystem init called in state {:?}", *state);
            return Err(QatError::ResourceInit {
                op: "init_memory",
                status: Status::Fail,
            });
        }

        let status = self.driver.mem_init();
        if !status.is_success() {
            log::error!("{}: memory subsystem init failed: {}", self.driver.name(), status);
            return Err(QatError::ResourceInit {
                op: "init_memory",
                status,
            });
        }

        *state = MemoryState::Ready;
        log::debug!("{}: memory subsystem ready", self.driver.name());
        Ok(())
    }

    /// Release the allocator. Best-effort: anomalies are logged, not returned.
    ///
    /// Teardown is skipped while any buffer is alive.
    pub(crate) fn destroy(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != MemoryState::Ready {
            log::warn!("memory subsystem destroy called in state {:?}", *state);
            return;
        }

        let live = self.live_buffers();
        if live > 0 {
            log::error!(
                "memory subsystem destroy skipped: {} DMA buffer(s) still alive",
                live
            );
            return;
        }

        self.driver.mem_destroy();
        *state = MemoryState::Destroyed;
        log::debug!("{}: memory subsystem destroyed", self.driver.name());
    }

    /// Allocate a zero-filled buffer of `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`QatError::ResourceInit`] if the allocator is not ready
    /// ([`Status::Fail`]) or out of memory ([`Status::Resource`]).
    pub fn alloc(self: &Arc<Self>, len: usize) -> QatResult<DmaBuffer> {
        if len == 0 {
            return Err(QatError::InvalidArgument(
                "DMA buffer length must be non-zero".to_string(),
            ));
        }

        // Hold the state lock so that destroy() cannot race with a new buffer.
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != MemoryState::Ready {
            return Err(QatError::ResourceInit {
                op: "alloc_buffer",
                status: Status::Fail,
            });
        }

        let ptr = NonNull::new(self.driver.mem_alloc(len)).ok_or(QatError::ResourceInit {
            op: "alloc_buffer",
            status: Status::Resource,
        })?;
        self.live.fetch_add(1, Ordering::AcqRel);
        drop(state);

        // SAFETY: ptr is valid for len bytes and exclusively ours.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, len) };

        Ok(DmaBuffer {
            ptr,
            len,
            pool: Arc::clone(self),
        })
    }

    /// Allocate a buffer holding a copy of `data`.
    pub fn alloc_from(self: &Arc<Self>, data: &[u8]) -> QatResult<DmaBuffer> {
        let mut buffer = self.alloc(data.len())?;
        buffer.as_mut_slice().copy_from_slice(data);
        Ok(buffer)
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("driver", &self.driver.name())
            .field("state", &self.state())
            .field("live", &self.live_buffers())
            .finish()
    }
}

/// Hardware-visible buffer obtained from a [`MemoryPool`].
///
/// The memory is returned to the allocator on drop.
pub struct DmaBuffer {
    ptr: NonNull<u8>,
    len: usize,
    pool: Arc<MemoryPool>,
}

// SAFETY: DmaBuffer exclusively owns its allocation, like a Box<[u8]>.
unsafe impl Send for DmaBuffer {}

// SAFETY: shared access only hands out &[u8].
unsafe impl Sync for DmaBuffer {}

impl DmaBuffer {
    /// Buffer length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length buffers cannot be allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Virtual address of the buffer.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Mutable virtual address of the buffer.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Buffer contents.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len initialized bytes for the buffer's lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mutable buffer contents.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Physical address as seen by the device.
    pub fn physical_addr(&self) -> u64 {
        let translate = self.pool.driver.virt_to_phys_fn();
        // SAFETY: the pointer comes from this driver's allocator.
        unsafe { translate(self.ptr.as_ptr().cast()) }
    }
}

impl std::fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr/len came from mem_alloc on the same driver.
        unsafe { self.pool.driver.mem_free(self.ptr.as_ptr(), self.len) };
        self.pool.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDriver, SimFault};

    fn pool_with(driver: SimDriver) -> Arc<MemoryPool> {
        MemoryPool::new(Arc::new(driver))
    }

    #[test]
    fn test_alloc_requires_init() {
        let pool = pool_with(SimDriver::new());
        let err = pool.alloc(32).unwrap_err();
        assert!(matches!(
            err,
            QatError::ResourceInit {
                status: Status::Fail,
                ..
            }
        ));
    }

    #[test]
    fn test_init_failure_is_resource_init_error() {
        let driver = SimDriver::new();
        driver.inject(SimFault::MemInit, Status::Resource);
        let pool = pool_with(driver);
        let err = pool.init().unwrap_err();
        assert!(matches!(
            err,
            QatError::ResourceInit {
                status: Status::Resource,
                ..
            }
        ));
        assert_eq!(pool.state(), MemoryState::Uninitialized);
    }

    #[test]
    fn test_double_init_rejected() {
        let pool = pool_with(SimDriver::new());
        pool.init().unwrap();
        assert!(pool.init().is_err());
        assert_eq!(pool.state(), MemoryState::Ready);
    }

    #[test]
    fn test_buffer_zeroed_and_copied() {
        let pool = pool_with(SimDriver::new());
        pool.init().unwrap();

        let zeroed = pool.alloc(16).unwrap();
        assert_eq!(zeroed.as_slice(), &[0u8; 16]);

        let copied = pool.alloc_from(&[0xAB; 8]).unwrap();
        assert_eq!(copied.as_slice(), &[0xAB; 8]);
        assert_eq!(copied.len(), 8);
        assert_ne!(copied.physical_addr(), 0);
        assert_eq!(pool.live_buffers(), 2);
    }

    #[test]
    fn test_zero_length_rejected() {
        let pool = pool_with(SimDriver::new());
        pool.init().unwrap();
        assert!(matches!(pool.alloc(0), Err(QatError::InvalidArgument(_))));
    }

    #[test]
    fn test_destroy_skipped_while_buffers_alive() {
        let pool = pool_with(SimDriver::new());
        pool.init().unwrap();
        let buffer = pool.alloc(64).unwrap();

        pool.destroy();
        assert_eq!(pool.state(), MemoryState::Ready);

        drop(buffer);
        assert_eq!(pool.live_buffers(), 0);
        pool.destroy();
        assert_eq!(pool.state(), MemoryState::Destroyed);
    }

    #[test]
    fn test_no_reinit_after_destroy() {
        let pool = pool_with(SimDriver::new());
        pool.init().unwrap();
        pool.destroy();
        assert!(pool.init().is_err());
        assert!(pool.alloc(8).is_err());
    }
}
