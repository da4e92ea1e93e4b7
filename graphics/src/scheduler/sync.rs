//! GPU synchronization primitives.
//!
//! Fences are CPU-visible: the ring buffer waits on them before reusing a
//! frame slot. Semaphores only order GPU work (swapchain acquire, submit,
//! present) and cannot be waited on from the CPU.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// GPU semaphore ordering work between the presentation engine and queues.
#[derive(Debug, PartialEq, Eq)]
pub struct Semaphore {
    /// Backend-assigned identifier.
    id: u64,
}

impl Semaphore {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }

    /// Get the semaphore's backend identifier.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

/// CPU-GPU synchronization primitive.
///
/// The backend signals the fence when a submission that names it retires.
/// Clones share state, so a backend can keep a clone of every fence that
/// still has work pending.
#[derive(Debug)]
pub struct Fence {
    id: u64,
    signaled: Arc<AtomicBool>,
}

impl Fence {
    pub(crate) fn new(id: u64, signaled: bool) -> Self {
        Self {
            id,
            signaled: Arc::new(AtomicBool::new(signaled)),
        }
    }

    /// Get the fence's backend identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        if self.signaled.load(Ordering::Acquire) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Reset the fence to unsignaled state.
    ///
    /// Must only be called when no GPU work is pending on this fence.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    /// Signal the fence. Called by backends when the GPU retires work.
    pub(crate) fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }
}

impl Clone for Fence {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            signaled: Arc::clone(&self.signaled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_id() {
        let sem = Semaphore::new(42);
        assert_eq!(sem.id(), 42);
    }

    #[test]
    fn test_fence_initial_state() {
        assert_eq!(Fence::new(0, false).status(), FenceStatus::Unsignaled);
        assert!(Fence::new(1, true).is_signaled());
    }

    #[test]
    fn test_fence_signal_from_thread() {
        let fence = Fence::new(7, false);

        let fence_clone = fence.clone();
        std::thread::spawn(move || fence_clone.signal())
            .join()
            .unwrap();

        assert!(fence.is_signaled());
    }

    #[test]
    fn test_fence_reset() {
        let fence = Fence::new(3, true);
        fence.reset();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_clone_shares_state() {
        let fence1 = Fence::new(5, false);
        let fence2 = fence1.clone();

        fence1.signal();

        assert!(fence2.is_signaled());
        assert_eq!(fence1.id(), fence2.id());
    }
}
