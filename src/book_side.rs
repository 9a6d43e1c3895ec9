//! Book side - one half of the order book.
//!
//! Combines the skip-list price index, a price -> level map and an
//! order-id -> arena-index map. The bid side orders prices descending,
//! the ask side ascending; everything else is shared.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::arena::{ArenaIndex, OrderArena, NIL};
use crate::command::{Order, OrderDepth, Side};
use crate::price_level::PriceLevel;
use crate::skiplist::{CapacityError, SkipList};

/// Initial skip-list slot count per side
pub const PRICE_CAPACITY: usize = 102_400;

/// Structural failure while mutating a book side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("invalid order: {0}")]
    InvalidArgument(&'static str),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

/// One side of the book: price index + level map + order map.
pub struct BookSide {
    side: Side,
    prices: SkipList,
    levels: FxHashMap<Decimal, PriceLevel>,
    orders: FxHashMap<String, ArenaIndex>,
    total_orders: i64,
    depths: i64,
}

impl BookSide {
    /// Bid side: best price is the highest.
    pub fn bids(seed: u64) -> Self {
        Self::new(Side::Buy, seed)
    }

    /// Ask side: best price is the lowest.
    pub fn asks(seed: u64) -> Self {
        Self::new(Side::Sell, seed)
    }

    fn new(side: Side, seed: u64) -> Self {
        Self {
            side,
            prices: SkipList::new(PRICE_CAPACITY, seed, side == Side::Buy),
            levels: FxHashMap::default(),
            orders: FxHashMap::default(),
            total_orders: 0,
            depths: 0,
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Rest `order` on this side.
    ///
    /// `is_front` splices at the level head, which preserves the time
    /// priority of a maker popped for a partial fill; new arrivals go to
    /// the tail.
    pub fn put_order(
        &mut self,
        arena: &mut OrderArena,
        order: Order,
        is_front: bool,
    ) -> Result<ArenaIndex, BookError> {
        if order.id.is_empty() {
            return Err(BookError::InvalidArgument("empty order id"));
        }
        if order.price <= Decimal::ZERO {
            return Err(BookError::InvalidArgument("non-positive price"));
        }
        debug_assert!(
            !self.orders.contains_key(&order.id),
            "duplicate id within one side"
        );

        let price = order.price;
        if !self.levels.contains_key(&price) {
            self.prices.insert(price)?;
            self.levels.insert(price, PriceLevel::new());
            self.depths += 1;
        }

        let id = order.id.clone();
        let index = arena.alloc(order);
        // the level was just ensured above
        if let Some(level) = self.levels.get_mut(&price) {
            if is_front {
                level.push_front(arena, index);
            } else {
                level.push_back(arena, index);
            }
        }
        self.orders.insert(id, index);
        self.total_orders += 1;
        Ok(index)
    }

    /// Remove an order by id, returning it.
    pub fn remove_order(&mut self, arena: &mut OrderArena, id: &str) -> Option<Order> {
        let index = self.orders.remove(id)?;
        Some(self.unlink(arena, index))
    }

    /// Resize an order in place; a non-positive size removes it.
    /// Returns `false` when the id is unknown.
    pub fn update_order_size(
        &mut self,
        arena: &mut OrderArena,
        id: &str,
        new_size: Decimal,
    ) -> bool {
        let Some(&index) = self.orders.get(id) else {
            return false;
        };
        if new_size <= Decimal::ZERO {
            self.orders.remove(id);
            self.unlink(arena, index);
            return true;
        }
        let price = arena.order(index).price;
        let old_size = arena.order(index).size;
        if let Some(level) = self.levels.get_mut(&price) {
            level.adjust_size(new_size - old_size);
        }
        arena.order_mut(index).size = new_size;
        true
    }

    /// Best price under this side's ordering.
    #[inline]
    pub fn best_price(&self) -> Option<Decimal> {
        self.prices.min()
    }

    /// Arena index of the order first in line at the best price.
    pub fn peek_head(&self) -> Option<ArenaIndex> {
        let price = self.prices.min()?;
        let level = self.levels.get(&price)?;
        if level.head == NIL {
            None
        } else {
            Some(level.head)
        }
    }

    /// Remove and return the order first in line at the best price.
    pub fn pop_head(&mut self, arena: &mut OrderArena) -> Option<Order> {
        let index = self.peek_head()?;
        let order = self.unlink(arena, index);
        self.orders.remove(&order.id);
        Some(order)
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.orders.contains_key(id)
    }

    #[inline]
    pub fn order_index(&self, id: &str) -> Option<ArenaIndex> {
        self.orders.get(id).copied()
    }

    #[inline]
    pub fn order_count(&self) -> i64 {
        self.total_orders
    }

    #[inline]
    pub fn depth_count(&self) -> i64 {
        self.depths
    }

    /// Distinct prices currently in the index.
    #[inline]
    pub fn price_count(&self) -> i64 {
        i64::from(self.prices.len())
    }

    /// Total size resting at prices that cross `limit`, summed best-first
    /// and stopping early once `cap` is reached. Used by fill-or-kill.
    pub fn liquidity_within(&self, limit: Decimal, cap: Decimal) -> Decimal {
        let mut total = Decimal::ZERO;
        for price in self.prices.iter() {
            let crosses = match self.side {
                Side::Sell => price <= limit,
                Side::Buy => price >= limit,
            };
            if !crosses {
                break;
            }
            if let Some(level) = self.levels.get(&price) {
                total += level.total_size;
            }
            if total >= cap {
                break;
            }
        }
        total
    }

    /// Value-copy every resting order, best price first, FIFO within a level.
    pub fn snapshot(&self, arena: &OrderArena) -> Vec<Order> {
        let mut out = Vec::with_capacity(self.total_orders as usize);
        for price in self.prices.iter() {
            if let Some(level) = self.levels.get(&price) {
                let mut index = level.head;
                while index != NIL {
                    out.push(arena.order(index).clone());
                    index = arena.get(index).next;
                }
            }
        }
        out
    }

    /// Up to `limit` aggregated levels, best price first.
    pub fn depth(&self, limit: usize) -> Vec<OrderDepth> {
        let mut out = Vec::with_capacity(limit.min(self.depths as usize));
        for price in self.prices.iter().take(limit) {
            if let Some(level) = self.levels.get(&price) {
                out.push(OrderDepth {
                    price,
                    size: level.total_size,
                    count: level.count,
                });
            }
        }
        out
    }

    /// Aggregate at one price, `(size, count)`; zeros when absent.
    pub fn depth_at(&self, price: Decimal) -> (Decimal, i64) {
        self.levels
            .get(&price)
            .map(|l| (l.total_size, l.count))
            .unwrap_or((Decimal::ZERO, 0))
    }

    fn unlink(&mut self, arena: &mut OrderArena, index: ArenaIndex) -> Order {
        let price = arena.order(index).price;
        if let Some(level) = self.levels.get_mut(&price) {
            if level.remove(arena, index) {
                self.levels.remove(&price);
                self.prices.remove(price);
                self.depths -= 1;
            }
        }
        self.total_orders -= 1;
        arena.free(index)
    }
}

impl std::fmt::Debug for BookSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookSide")
            .field("side", &self.side)
            .field("orders", &self.total_orders)
            .field("depths", &self.depths)
            .field("best", &self.best_price())
            .finish()
    }
}
