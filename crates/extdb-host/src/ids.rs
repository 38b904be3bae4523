//! Correlation ID allocation.
//!
//! A small-integer allocator with free-list reuse, the same shape as
//! `ConnectionPoolManager`'s `next_handle` counter in the teacher workspace,
//! except recycled ids are preferred over growing the counter — the wire
//! ABI and any host-side bookkeeping keyed on these ids benefit from them
//! staying compact.

use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    next: u64,
    free: Vec<u64>,
}

/// Hands out and recycles non-negative integer correlation ids.
pub struct IdAllocator {
    inner: Mutex<Inner>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Returns a previously freed id if one is available, else the next
    /// unused integer.
    pub fn allocate(&self) -> u64 {
        let mut inner = self.inner.lock().expect("id allocator mutex poisoned");
        if let Some(id) = inner.free.pop() {
            return id;
        }
        let id = inner.next;
        inner.next += 1;
        id
    }

    /// Returns `id` to the free list. Callers must ensure `id` is no longer
    /// present in the wait set or result store before calling this — see
    /// `ResultStore::poll`, the only caller in this crate.
    pub fn free(&self, id: u64) {
        let mut inner = self.inner.lock().expect("id allocator mutex poisoned");
        inner.free.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequentially_when_nothing_freed() {
        let alloc = IdAllocator::new();
        assert_eq!(alloc.allocate(), 0);
        assert_eq!(alloc.allocate(), 1);
        assert_eq!(alloc.allocate(), 2);
    }

    #[test]
    fn reuses_freed_ids_before_growing() {
        let alloc = IdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        alloc.free(a);
        assert_eq!(alloc.allocate(), a);
        let c = alloc.allocate();
        assert_ne!(c, b);
    }
}
