//! Reusable object pools for the consumer-side hot path.
//!
//! The pool is deliberately single-threaded: per the concurrency model,
//! everything it backs is touched only by the consumer thread. The
//! acquire/release seam stays even where the allocator would do fine, so
//! pooling can widen without touching call sites.

/// Returned objects are wiped before they go back on the shelf.
pub trait Recycle {
    fn recycle(&mut self);
}

impl<T> Recycle for Vec<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl Recycle for String {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// A simple last-in-first-out pool.
pub struct Pool<T: Recycle + Default> {
    free: Vec<T>,
}

impl<T: Recycle + Default> Pool<T> {
    pub fn new() -> Self {
        Self { free: Vec::new() }
    }

    /// Pre-populate with `count` fresh objects.
    pub fn with_capacity(count: usize) -> Self {
        let mut free = Vec::with_capacity(count);
        free.resize_with(count, T::default);
        Self { free }
    }

    /// Take an object, creating one if the shelf is empty.
    #[inline]
    pub fn acquire(&mut self) -> T {
        self.free.pop().unwrap_or_default()
    }

    /// Wipe an object and put it back.
    #[inline]
    pub fn release(&mut self, mut item: T) {
        item.recycle();
        self.free.push(item);
    }

    #[inline]
    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

impl<T: Recycle + Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}
