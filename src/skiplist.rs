//! Price index - an arena-backed skip list over distinct price levels.
//!
//! Nodes live in one contiguous slab and link through 32-bit indices;
//! removed nodes go onto a free list threaded through `forward[0]`.
//! A `descending` flag at construction reverses the comparator, which is
//! how the bid side (highest price first) and the ask side (lowest first)
//! share the same code. `min()` always returns the best price under the
//! configured order.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::arena::{ArenaIndex, NIL};

/// Tallest tower a node can reach
pub const MAX_LEVEL: usize = 16;
/// Level promotion happens with probability 1/RANDOM_LEVEL_RATE
pub const RANDOM_LEVEL_RATE: u32 = 4;
const SCALE_FACTOR: usize = 2;
const MAX_CAPACITY: usize = i32::MAX as usize;

/// The node slab can no longer grow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("price index at maximum capacity")]
pub struct CapacityError;

#[derive(Clone)]
struct SkipNode {
    price: Decimal,
    level: i32,
    forward: [ArenaIndex; MAX_LEVEL],
}

impl SkipNode {
    fn empty() -> Self {
        Self {
            price: Decimal::ZERO,
            level: 0,
            forward: [NIL; MAX_LEVEL],
        }
    }
}

/// Ordered set of prices with O(log N) insert/remove and O(1) best-price.
pub struct SkipList {
    nodes: Vec<SkipNode>,
    len: i32,
    level: i32,
    free_head: ArenaIndex,
    descending: bool,
    rng: ChaCha8Rng,
}

impl SkipList {
    /// Create an index with `capacity` usable slots (plus the sentinel).
    ///
    /// The random source is seeded so level geometry is reproducible.
    ///
    /// # Panics
    /// Panics if `capacity` is zero or exceeds `i32::MAX`.
    pub fn new(capacity: usize, seed: u64, descending: bool) -> Self {
        assert!(
            capacity > 0 && capacity <= MAX_CAPACITY,
            "capacity must be between 1 and i32::MAX"
        );
        let mut nodes = vec![SkipNode::empty(); capacity + 1];
        // node 0 is the sentinel head
        nodes[0].level = MAX_LEVEL as i32;
        // free list over slots 1..=capacity
        for i in 1..capacity {
            nodes[i].forward[0] = (i + 1) as ArenaIndex;
        }
        nodes[capacity].forward[0] = NIL;
        Self {
            nodes,
            len: 0,
            level: 1,
            free_head: 1,
            descending,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Insert a price. Returns `false` if it was already present.
    pub fn insert(&mut self, price: Decimal) -> Result<bool, CapacityError> {
        let mut update = [0 as ArenaIndex; MAX_LEVEL];
        let mut x = 0;
        for i in (0..MAX_LEVEL).rev() {
            while self.nodes[x as usize].forward[i] != NIL
                && self.less(self.nodes[self.nodes[x as usize].forward[i] as usize].price, price)
            {
                x = self.nodes[x as usize].forward[i];
            }
            update[i] = x;
        }
        x = self.nodes[x as usize].forward[0];
        if x != NIL && self.nodes[x as usize].price == price {
            return Ok(false);
        }
        let new_level = self.random_level();
        if new_level > self.level {
            for slot in update.iter_mut().take(new_level as usize).skip(self.level as usize) {
                *slot = 0;
            }
            self.level = new_level;
        }
        let node_index = self.alloc()?;
        self.nodes[node_index as usize].price = price;
        self.nodes[node_index as usize].level = new_level;
        for i in 0..new_level as usize {
            self.nodes[node_index as usize].forward[i] = self.nodes[update[i] as usize].forward[i];
            self.nodes[update[i] as usize].forward[i] = node_index;
        }
        self.len += 1;
        Ok(true)
    }

    /// Remove a price. Returns whether removal happened.
    pub fn remove(&mut self, price: Decimal) -> bool {
        let mut update = [0 as ArenaIndex; MAX_LEVEL];
        let mut x = 0;
        for i in (0..MAX_LEVEL).rev() {
            while self.nodes[x as usize].forward[i] != NIL
                && self.less(self.nodes[self.nodes[x as usize].forward[i] as usize].price, price)
            {
                x = self.nodes[x as usize].forward[i];
            }
            update[i] = x;
        }
        x = self.nodes[x as usize].forward[0];
        if x == NIL || self.nodes[x as usize].price != price {
            return false;
        }
        for i in 0..self.level as usize {
            if self.nodes[update[i] as usize].forward[i] != x {
                break;
            }
            self.nodes[update[i] as usize].forward[i] = self.nodes[x as usize].forward[i];
        }
        self.free_node(x);
        self.shrink_level();
        self.len -= 1;
        true
    }

    /// Presence check; returns the node index when found.
    pub fn contains(&self, price: Decimal) -> Option<ArenaIndex> {
        let mut x = 0;
        for i in (0..MAX_LEVEL).rev() {
            while self.nodes[x as usize].forward[i] != NIL
                && self.less(self.nodes[self.nodes[x as usize].forward[i] as usize].price, price)
            {
                x = self.nodes[x as usize].forward[i];
            }
        }
        x = self.nodes[x as usize].forward[0];
        if x != NIL && self.nodes[x as usize].price == price {
            Some(x)
        } else {
            None
        }
    }

    /// Best price under the configured ordering.
    #[inline]
    pub fn min(&self) -> Option<Decimal> {
        let x = self.nodes[0].forward[0];
        if x == NIL {
            None
        } else {
            Some(self.nodes[x as usize].price)
        }
    }

    /// Pop the best price.
    pub fn remove_min(&mut self) -> Option<Decimal> {
        let x = self.nodes[0].forward[0];
        if x == NIL {
            return None;
        }
        let min_price = self.nodes[x as usize].price;
        for i in 0..self.level as usize {
            if self.nodes[0].forward[i] != x {
                break;
            }
            self.nodes[0].forward[i] = self.nodes[x as usize].forward[i];
        }
        self.free_node(x);
        self.shrink_level();
        self.len -= 1;
        Some(min_price)
    }

    /// In-order walk over all prices (best first).
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            current: self.nodes[0].forward[0],
        }
    }

    /// All prices in index order.
    pub fn values(&self) -> Vec<Decimal> {
        self.iter().collect()
    }

    /// Prices reachable at `level`; diagnostic walk.
    pub fn level_nodes(&self, level: usize) -> Vec<Decimal> {
        if level >= MAX_LEVEL {
            return Vec::new();
        }
        let mut result = Vec::new();
        let mut x = self.nodes[0].forward[level];
        while x != NIL {
            result.push(self.nodes[x as usize].price);
            x = self.nodes[x as usize].forward[level];
        }
        result
    }

    #[inline]
    pub fn len(&self) -> i32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    fn free_node(&mut self, index: ArenaIndex) {
        self.nodes[index as usize].forward[0] = self.free_head;
        self.free_head = index;
    }

    fn shrink_level(&mut self) {
        while self.level > 1 && self.nodes[0].forward[(self.level - 1) as usize] == NIL {
            self.level -= 1;
        }
    }

    fn alloc(&mut self) -> Result<ArenaIndex, CapacityError> {
        if self.free_head == NIL {
            self.scale()?;
        }
        let index = self.free_head;
        self.free_head = self.nodes[index as usize].forward[0];
        self.nodes[index as usize].forward = [NIL; MAX_LEVEL];
        Ok(index)
    }

    fn scale(&mut self) -> Result<(), CapacityError> {
        let old = self.nodes.len();
        if old >= MAX_CAPACITY {
            return Err(CapacityError);
        }
        let new = (old * SCALE_FACTOR).min(MAX_CAPACITY);
        self.nodes.resize(new, SkipNode::empty());
        for i in old..new - 1 {
            self.nodes[i].forward[0] = (i + 1) as ArenaIndex;
        }
        self.nodes[new - 1].forward[0] = self.free_head;
        self.free_head = old as ArenaIndex;
        Ok(())
    }

    /// `a < b` under the configured ordering
    #[inline]
    fn less(&self, a: Decimal, b: Decimal) -> bool {
        if self.descending {
            a > b
        } else {
            a < b
        }
    }

    fn random_level(&mut self) -> i32 {
        let mut level = 1;
        while level < MAX_LEVEL as i32 && self.rng.gen_range(0..RANDOM_LEVEL_RATE) == 0 {
            level += 1;
        }
        level
    }
}

impl std::fmt::Debug for SkipList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipList")
            .field("len", &self.len)
            .field("level", &self.level)
            .field("capacity", &self.nodes.len())
            .field("descending", &self.descending)
            .finish()
    }
}

/// In-order iterator over prices
pub struct Iter<'a> {
    list: &'a SkipList,
    current: ArenaIndex,
}

impl Iterator for Iter<'_> {
    type Item = Decimal;

    fn next(&mut self) -> Option<Decimal> {
        if self.current == NIL {
            return None;
        }
        let price = self.list.nodes[self.current as usize].price;
        self.current = self.list.nodes[self.current as usize].forward[0];
        Some(price)
    }
}
