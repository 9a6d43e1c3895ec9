//! Price level - a FIFO chain of orders resting at one price.
//!
//! The chain is doubly linked through arena indices, so insertion at
//! either end and removal from any position are O(1).

use rust_decimal::Decimal;

use crate::arena::{ArenaIndex, OrderArena, NIL};

/// Aggregated FIFO queue of orders at a single price.
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    /// Oldest order (first to match)
    pub head: ArenaIndex,
    /// Newest order (last to match)
    pub tail: ArenaIndex,
    /// Sum of visible sizes across the chain
    pub total_size: Decimal,
    /// Chain length
    pub count: i64,
}

impl PriceLevel {
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            total_size: Decimal::ZERO,
            count: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append at the tail (normal arrival order).
    pub fn push_back(&mut self, arena: &mut OrderArena, index: ArenaIndex) {
        let size = arena.order(index).size;
        if self.tail == NIL {
            debug_assert!(self.head == NIL);
            self.head = index;
            self.tail = index;
            let node = arena.get_mut(index);
            node.prev = NIL;
            node.next = NIL;
        } else {
            arena.get_mut(self.tail).next = index;
            let node = arena.get_mut(index);
            node.prev = self.tail;
            node.next = NIL;
            self.tail = index;
        }
        self.count += 1;
        self.total_size += size;
    }

    /// Splice at the head. Used for a maker popped and re-inserted after a
    /// partial fill, so its time priority survives.
    pub fn push_front(&mut self, arena: &mut OrderArena, index: ArenaIndex) {
        let size = arena.order(index).size;
        if self.head == NIL {
            debug_assert!(self.tail == NIL);
            self.head = index;
            self.tail = index;
            let node = arena.get_mut(index);
            node.prev = NIL;
            node.next = NIL;
        } else {
            arena.get_mut(self.head).prev = index;
            let node = arena.get_mut(index);
            node.next = self.head;
            node.prev = NIL;
            self.head = index;
        }
        self.count += 1;
        self.total_size += size;
    }

    /// Unlink `index` from anywhere in the chain.
    ///
    /// Returns `true` when the level is now empty. The node itself is not
    /// released; the caller owns that step.
    pub fn remove(&mut self, arena: &mut OrderArena, index: ArenaIndex) -> bool {
        let node = arena.get(index);
        let prev = node.prev;
        let next = node.next;
        let size = node.order.size;

        if prev != NIL {
            arena.get_mut(prev).next = next;
        } else {
            debug_assert!(self.head == index);
            self.head = next;
        }
        if next != NIL {
            arena.get_mut(next).prev = prev;
        } else {
            debug_assert!(self.tail == index);
            self.tail = prev;
        }

        let node = arena.get_mut(index);
        node.prev = NIL;
        node.next = NIL;

        self.count -= 1;
        self.total_size -= size;
        self.count == 0
    }

    /// Adjust the aggregate after an in-place resize of one order.
    #[inline]
    pub fn adjust_size(&mut self, delta: Decimal) {
        self.total_size += delta;
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}
