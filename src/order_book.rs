//! Order book - command dispatch, matching and log emission.
//!
//! All methods here run on the single consumer thread; nothing in this
//! module is synchronized. Producers reach the book only through the ring
//! buffer, so sequence and trade ids are plain integers and still come
//! out strictly monotonic.
//!
//! Matching is price-time priority in two phases: an aggressive crossing
//! phase against the opposite side, then (for order types that rest) a
//! passive posting phase for the residual.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::arena::OrderArena;
use crate::book_side::BookSide;
use crate::codec;
use crate::command::{
    AmendOrderCommand, CancelOrderCommand, Command, CommandType, InputEvent, Order,
    OrderBookState, OrderDepth, OrderType, PlaceOrderCommand, ResumeMarketCommand, Side,
    SuspendMarketCommand,
};
use crate::log::{OrderBookLog, PushLog, RejectReason};
use crate::pool::Pool;
use crate::ring::EventHandler;

/// Smallest tradable quantity increment: 1e-8
pub const DEFAULT_LOT_SIZE: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Fractional digits carried by quote-driven size computation
const SIZE_SCALE: u32 = 8;

/// Initial order-arena slot count
const ORDER_CAPACITY: usize = 65_536;

/// Single-market limit order book with price-time priority matching.
pub struct OrderBook {
    market_id: String,
    lot_size: Decimal,
    state: OrderBookState,
    seq_id: i64,
    trade_id: i64,
    arena: OrderArena,
    bid: BookSide,
    ask: BookSide,
    sink: Box<dyn PushLog>,
    batch_pool: Pool<Vec<OrderBookLog>>,
}

impl OrderBook {
    /// Book with the default lot size and a clock-derived price-index seed.
    pub fn new(market_id: impl Into<String>, sink: Box<dyn PushLog>) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::with_options(market_id, sink, DEFAULT_LOT_SIZE, seed)
    }

    /// Fully parameterized constructor; a fixed `price_seed` makes the
    /// skip-list geometry reproducible across runs.
    pub fn with_options(
        market_id: impl Into<String>,
        sink: Box<dyn PushLog>,
        lot_size: Decimal,
        price_seed: u64,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            lot_size,
            state: OrderBookState::Running,
            seq_id: 0,
            trade_id: 0,
            arena: OrderArena::new(ORDER_CAPACITY),
            bid: BookSide::bids(price_seed),
            ask: BookSide::asks(price_seed.wrapping_add(1)),
            sink,
            batch_pool: Pool::with_capacity(2),
        }
    }

    /// Decode, dispatch and publish the resulting log batch.
    pub fn process_command(&mut self, cmd: Command) {
        let mut logs = self.batch_pool.acquire();
        match cmd.cmd_type {
            CommandType::SuspendMarket => match codec::decode::<SuspendMarketCommand>(&cmd.payload)
            {
                Ok(payload) => self.handle_suspend_market(&payload, &mut logs),
                Err(_) => self.push_decode_reject(&mut logs),
            },
            CommandType::ResumeMarket => match codec::decode::<ResumeMarketCommand>(&cmd.payload) {
                Ok(payload) => self.handle_resume_market(&payload, &mut logs),
                Err(_) => self.push_decode_reject(&mut logs),
            },
            CommandType::PlaceOrder => match codec::decode::<PlaceOrderCommand>(&cmd.payload) {
                Ok(payload) => self.handle_place_order(payload, &mut logs),
                Err(_) => self.push_decode_reject(&mut logs),
            },
            CommandType::CancelOrder => match codec::decode::<CancelOrderCommand>(&cmd.payload) {
                Ok(payload) => self.handle_cancel_order(&payload, &mut logs),
                Err(_) => self.push_decode_reject(&mut logs),
            },
            CommandType::AmendOrder => match codec::decode::<AmendOrderCommand>(&cmd.payload) {
                Ok(payload) => self.handle_amend_order(&payload, &mut logs),
                Err(_) => self.push_decode_reject(&mut logs),
            },
        }
        if !logs.is_empty() {
            self.sink.publish(&logs);
        }
        self.batch_pool.release(logs);
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    fn handle_suspend_market(
        &mut self,
        payload: &SuspendMarketCommand,
        logs: &mut Vec<OrderBookLog>,
    ) {
        if self.state == OrderBookState::Stopped {
            self.push_reject(
                logs,
                "",
                payload.user_id,
                RejectReason::StateHadDone,
                Utc::now().timestamp(),
            );
            return;
        }
        self.state = OrderBookState::Paused;
    }

    fn handle_resume_market(
        &mut self,
        payload: &ResumeMarketCommand,
        logs: &mut Vec<OrderBookLog>,
    ) {
        if self.state == OrderBookState::Stopped {
            self.push_reject(
                logs,
                "",
                payload.user_id,
                RejectReason::StateHadDone,
                Utc::now().timestamp(),
            );
            return;
        }
        self.state = OrderBookState::Running;
    }

    fn handle_place_order(&mut self, payload: PlaceOrderCommand, logs: &mut Vec<OrderBookLog>) {
        let Ok(price) = payload.price.parse::<Decimal>() else {
            self.push_reject(
                logs,
                &payload.order_id,
                payload.user_id,
                RejectReason::InvalidPayload,
                payload.timestamp,
            );
            return;
        };
        let Ok(size) = payload.size.parse::<Decimal>() else {
            self.push_reject(
                logs,
                &payload.order_id,
                payload.user_id,
                RejectReason::InvalidPayload,
                payload.timestamp,
            );
            return;
        };
        // optional decimals parse leniently as zero
        let visible_limit = payload.visible_limit.parse::<Decimal>().unwrap_or(Decimal::ZERO);
        let quote_size = payload.quote_size.parse::<Decimal>().unwrap_or(Decimal::ZERO);

        if self.state != OrderBookState::Running {
            self.push_reject(
                logs,
                &payload.order_id,
                payload.user_id,
                RejectReason::StateHadDone,
                payload.timestamp,
            );
            return;
        }
        if self.bid.contains(&payload.order_id) || self.ask.contains(&payload.order_id) {
            self.push_reject(
                logs,
                &payload.order_id,
                payload.user_id,
                RejectReason::DuplicateOrderId,
                payload.timestamp,
            );
            return;
        }

        let mut order = Order {
            id: payload.order_id,
            side: payload.side,
            price,
            size,
            order_type: payload.order_type,
            user_id: payload.user_id,
            timestamp: payload.timestamp,
            visible_limit: if visible_limit > Decimal::ZERO && visible_limit < size {
                visible_limit
            } else {
                Decimal::ZERO
            },
            hidden_size: Decimal::ZERO,
        };

        match order.order_type {
            OrderType::Market => {
                let valid = order.size >= Decimal::ZERO
                    && quote_size >= Decimal::ZERO
                    && (order.size > Decimal::ZERO || quote_size > Decimal::ZERO);
                if !valid {
                    let (id, user_id, ts) = (order.id, order.user_id, order.timestamp);
                    self.push_reject(logs, &id, user_id, RejectReason::InvalidPayload, ts);
                    return;
                }
                self.match_market(order, quote_size, logs);
            }
            OrderType::Limit | OrderType::Ioc | OrderType::Fok | OrderType::PostOnly => {
                if order.price <= Decimal::ZERO {
                    let (id, user_id, ts) = (order.id, order.user_id, order.timestamp);
                    self.push_reject(logs, &id, user_id, RejectReason::InvalidPayload, ts);
                    return;
                }
                if order.size < self.lot_size {
                    self.push_market_reject(logs, &order, RejectReason::LowSize, order.size);
                    return;
                }
                match order.order_type {
                    OrderType::Limit => {
                        self.cross(&mut order, logs);
                        if order.size > Decimal::ZERO {
                            self.rest_order(order, logs);
                        }
                    }
                    OrderType::Ioc => {
                        self.cross(&mut order, logs);
                        if order.size > Decimal::ZERO {
                            self.seq_id += 1;
                            logs.push(OrderBookLog::cancel(
                                self.seq_id,
                                &self.market_id,
                                &order,
                                order.size,
                            ));
                        }
                    }
                    OrderType::Fok => self.match_fok(order, logs),
                    OrderType::PostOnly => {
                        if self.would_cross(&order) {
                            self.push_market_reject(
                                logs,
                                &order,
                                RejectReason::PostOnlyCross,
                                order.size,
                            );
                        } else {
                            self.rest_order(order, logs);
                        }
                    }
                    _ => unreachable!(),
                }
            }
            OrderType::Cancel => {
                let (id, user_id, ts) = (order.id, order.user_id, order.timestamp);
                self.push_reject(logs, &id, user_id, RejectReason::InvalidPayload, ts);
            }
        }
    }

    fn handle_cancel_order(&mut self, payload: &CancelOrderCommand, logs: &mut Vec<OrderBookLog>) {
        let removed = match self.bid.remove_order(&mut self.arena, &payload.order_id) {
            Some(order) => Some(order),
            None => self.ask.remove_order(&mut self.arena, &payload.order_id),
        };
        match removed {
            Some(order) => {
                self.seq_id += 1;
                let cancelled = order.size + order.hidden_size;
                logs.push(OrderBookLog::cancel(
                    self.seq_id,
                    &self.market_id,
                    &order,
                    cancelled,
                ));
            }
            None => self.push_reject(
                logs,
                &payload.order_id,
                payload.user_id,
                RejectReason::OrderNotFound,
                payload.timestamp,
            ),
        }
    }

    /// A same-price size reduction keeps time priority; everything else
    /// loses it and re-enters matching (the book must never stay crossed).
    fn handle_amend_order(&mut self, payload: &AmendOrderCommand, logs: &mut Vec<OrderBookLog>) {
        let (Ok(new_price), Ok(new_size)) = (
            payload.new_price.parse::<Decimal>(),
            payload.new_size.parse::<Decimal>(),
        ) else {
            self.push_reject(
                logs,
                &payload.order_id,
                payload.user_id,
                RejectReason::InvalidPayload,
                payload.timestamp,
            );
            return;
        };
        if new_price <= Decimal::ZERO || new_size <= Decimal::ZERO {
            self.push_reject(
                logs,
                &payload.order_id,
                payload.user_id,
                RejectReason::InvalidPayload,
                payload.timestamp,
            );
            return;
        }

        let (in_bid, index) = if let Some(idx) = self.bid.order_index(&payload.order_id) {
            (true, idx)
        } else if let Some(idx) = self.ask.order_index(&payload.order_id) {
            (false, idx)
        } else {
            self.push_reject(
                logs,
                &payload.order_id,
                payload.user_id,
                RejectReason::OrderNotFound,
                payload.timestamp,
            );
            return;
        };
        let pre_price = self.arena.order(index).price;
        let pre_size = self.arena.order(index).size;

        if new_price == pre_price && new_size < pre_size {
            if in_bid {
                self.bid
                    .update_order_size(&mut self.arena, &payload.order_id, new_size);
            } else {
                self.ask
                    .update_order_size(&mut self.arena, &payload.order_id, new_size);
            }
            self.seq_id += 1;
            logs.push(OrderBookLog::amend(
                self.seq_id,
                &self.market_id,
                self.arena.order(index),
                pre_price,
                pre_size,
            ));
            return;
        }

        let removed = if in_bid {
            self.bid.remove_order(&mut self.arena, &payload.order_id)
        } else {
            self.ask.remove_order(&mut self.arena, &payload.order_id)
        };
        let Some(mut order) = removed else {
            return;
        };
        order.price = new_price;
        order.size = new_size;
        // the hidden reserve collapses into the new total; re-split on rest
        order.hidden_size = Decimal::ZERO;
        order.timestamp = payload.timestamp;
        self.seq_id += 1;
        logs.push(OrderBookLog::amend(
            self.seq_id,
            &self.market_id,
            &order,
            pre_price,
            pre_size,
        ));
        self.cross(&mut order, logs);
        if order.size > Decimal::ZERO {
            self.rest_order(order, logs);
        }
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Aggressive phase: consume opposite-side liquidity while prices
    /// cross, mutating `order.size` down to the residual.
    fn cross(&mut self, order: &mut Order, logs: &mut Vec<OrderBookLog>) {
        loop {
            if order.size <= Decimal::ZERO {
                break;
            }
            let best = match order.side {
                Side::Buy => self.ask.best_price(),
                Side::Sell => self.bid.best_price(),
            };
            let Some(best_price) = best else {
                break;
            };
            let crosses = match order.side {
                Side::Buy => order.price >= best_price,
                Side::Sell => order.price <= best_price,
            };
            if !crosses {
                break;
            }
            let maker = match order.side {
                Side::Buy => self.ask.pop_head(&mut self.arena),
                Side::Sell => self.bid.pop_head(&mut self.arena),
            };
            let Some(mut maker) = maker else {
                break;
            };
            if order.size >= maker.size {
                // maker fully consumed
                self.seq_id += 1;
                self.trade_id += 1;
                logs.push(OrderBookLog::matched(
                    self.seq_id,
                    self.trade_id,
                    &self.market_id,
                    order,
                    &maker,
                    maker.price,
                    maker.size,
                ));
                order.size -= maker.size;
                self.refill_iceberg(maker, logs);
            } else {
                // maker partially consumed; it keeps the front of its level
                self.seq_id += 1;
                self.trade_id += 1;
                logs.push(OrderBookLog::matched(
                    self.seq_id,
                    self.trade_id,
                    &self.market_id,
                    order,
                    &maker,
                    maker.price,
                    order.size,
                ));
                maker.size -= order.size;
                order.size = Decimal::ZERO;
                self.reinsert(maker, true);
                break;
            }
        }
    }

    /// Market order sweep, driven either by base size or quote notional.
    fn match_market(
        &mut self,
        mut order: Order,
        mut quote_size: Decimal,
        logs: &mut Vec<OrderBookLog>,
    ) {
        let use_quote = order.size.is_zero() && !quote_size.is_zero();
        loop {
            let head = match order.side {
                Side::Buy => self.ask.peek_head(),
                Side::Sell => self.bid.peek_head(),
            };
            let Some(head_index) = head else {
                let remaining = if use_quote { quote_size } else { order.size };
                self.push_market_reject(logs, &order, RejectReason::NoLiquidity, remaining);
                break;
            };
            let maker_price = self.arena.order(head_index).price;
            let maker_size = self.arena.order(head_index).size;
            let mut match_size = if use_quote {
                // how much base the remaining quote buys at this level
                (quote_size / maker_price).trunc_with_scale(SIZE_SCALE)
            } else {
                order.size
            };
            if match_size > maker_size {
                match_size = maker_size;
            }
            if match_size < self.lot_size {
                // leave the maker resting
                let remaining = if use_quote { quote_size } else { order.size };
                self.push_market_reject(logs, &order, RejectReason::LowSize, remaining);
                break;
            }
            let maker = match order.side {
                Side::Buy => self.ask.pop_head(&mut self.arena),
                Side::Sell => self.bid.pop_head(&mut self.arena),
            };
            let Some(mut maker) = maker else {
                break;
            };
            self.seq_id += 1;
            self.trade_id += 1;
            logs.push(OrderBookLog::matched(
                self.seq_id,
                self.trade_id,
                &self.market_id,
                &order,
                &maker,
                maker.price,
                match_size,
            ));
            if use_quote {
                quote_size -= match_size * maker.price;
            } else {
                order.size -= match_size;
            }
            if match_size == maker.size {
                self.refill_iceberg(maker, logs);
            } else {
                maker.size -= match_size;
                self.reinsert(maker, true);
            }
            let done = if use_quote {
                quote_size <= Decimal::ZERO
            } else {
                order.size <= Decimal::ZERO
            };
            if done {
                break;
            }
        }
    }

    /// Fill-or-kill: either the whole size is achievable or nothing moves.
    fn match_fok(&mut self, mut order: Order, logs: &mut Vec<OrderBookLog>) {
        let available = match order.side {
            Side::Buy => self.ask.liquidity_within(order.price, order.size),
            Side::Sell => self.bid.liquidity_within(order.price, order.size),
        };
        if available < order.size {
            self.push_market_reject(logs, &order, RejectReason::NoLiquidity, order.size);
            return;
        }
        self.cross(&mut order, logs);
        debug_assert!(order.size.is_zero(), "fok pre-scan guaranteed a full fill");
    }

    fn would_cross(&self, order: &Order) -> bool {
        let best = match order.side {
            Side::Buy => self.ask.best_price(),
            Side::Sell => self.bid.best_price(),
        };
        match best {
            Some(best_price) => match order.side {
                Side::Buy => order.price >= best_price,
                Side::Sell => order.price <= best_price,
            },
            None => false,
        }
    }

    /// Passive phase: split an iceberg into its visible slice and hidden
    /// reserve, rest at the tail and log the opening.
    fn rest_order(&mut self, mut order: Order, logs: &mut Vec<OrderBookLog>) {
        if order.visible_limit > Decimal::ZERO && order.visible_limit < order.size {
            order.hidden_size = order.size - order.visible_limit;
            order.size = order.visible_limit;
        }
        self.seq_id += 1;
        let log = OrderBookLog::open(self.seq_id, &self.market_id, &order);
        let placed = match order.side {
            Side::Buy => self.bid.put_order(&mut self.arena, order, false),
            Side::Sell => self.ask.put_order(&mut self.arena, order, false),
        };
        match placed {
            Ok(_) => logs.push(log),
            Err(_) => {
                // structural exhaustion: same sequence becomes a reject
                let mut reject = OrderBookLog::reject(
                    self.seq_id,
                    &self.market_id,
                    &log.order_id,
                    log.user_id,
                    RejectReason::Capacity,
                    log.timestamp,
                );
                reject.side = log.side;
                reject.order_type = log.order_type;
                reject.price = log.price;
                reject.size = log.size;
                logs.push(reject);
            }
        }
    }

    /// Expose the next slice of a consumed iceberg at the tail of its
    /// level (time priority resets, the standard iceberg rule).
    fn refill_iceberg(&mut self, mut maker: Order, logs: &mut Vec<OrderBookLog>) {
        if maker.hidden_size <= Decimal::ZERO {
            return;
        }
        let chunk = maker.visible_limit.min(maker.hidden_size);
        maker.size = chunk;
        maker.hidden_size -= chunk;
        self.seq_id += 1;
        logs.push(OrderBookLog::open(self.seq_id, &self.market_id, &maker));
        self.reinsert(maker, false);
    }

    /// Re-insert a maker that was popped a moment ago. Its level either
    /// still exists or its index node was just freed, so this cannot
    /// exhaust the price index.
    fn reinsert(&mut self, maker: Order, is_front: bool) {
        let placed = match maker.side {
            Side::Buy => self.bid.put_order(&mut self.arena, maker, is_front),
            Side::Sell => self.ask.put_order(&mut self.arena, maker, is_front),
        };
        debug_assert!(placed.is_ok(), "re-insert of a popped maker cannot fail");
        let _ = placed;
    }

    // ========================================================================
    // Log helpers
    // ========================================================================

    fn push_reject(
        &mut self,
        logs: &mut Vec<OrderBookLog>,
        order_id: &str,
        user_id: i64,
        reason: RejectReason,
        timestamp: i64,
    ) {
        self.seq_id += 1;
        logs.push(OrderBookLog::reject(
            self.seq_id,
            &self.market_id,
            order_id,
            user_id,
            reason,
            timestamp,
        ));
    }

    /// Reject carrying the order's side/type/price and the unfilled size.
    fn push_market_reject(
        &mut self,
        logs: &mut Vec<OrderBookLog>,
        order: &Order,
        reason: RejectReason,
        remaining: Decimal,
    ) {
        self.seq_id += 1;
        let mut log = OrderBookLog::reject(
            self.seq_id,
            &self.market_id,
            &order.id,
            order.user_id,
            reason,
            order.timestamp,
        );
        log.side = order.side;
        log.order_type = order.order_type;
        log.price = order.price;
        log.size = remaining;
        logs.push(log);
    }

    fn push_decode_reject(&mut self, logs: &mut Vec<OrderBookLog>) {
        self.push_reject(
            logs,
            "",
            0,
            RejectReason::InvalidPayload,
            Utc::now().timestamp(),
        );
    }

    // ========================================================================
    // Probes
    // ========================================================================

    #[inline]
    pub fn market_id(&self) -> &str {
        &self.market_id
    }

    #[inline]
    pub fn state(&self) -> OrderBookState {
        self.state
    }

    /// Terminal transition; further suspend/resume/place commands reject.
    pub fn halt(&mut self) {
        self.state = OrderBookState::Stopped;
    }

    #[inline]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bid.best_price()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.ask.best_price()
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    pub fn order_count(&self) -> i64 {
        self.bid.order_count() + self.ask.order_count()
    }

    pub fn depth(&self, side: Side, limit: usize) -> Vec<OrderDepth> {
        match side {
            Side::Buy => self.bid.depth(limit),
            Side::Sell => self.ask.depth(limit),
        }
    }

    pub fn snapshot(&self, side: Side) -> Vec<Order> {
        match side {
            Side::Buy => self.bid.snapshot(&self.arena),
            Side::Sell => self.ask.snapshot(&self.arena),
        }
    }

    /// Structural invariants for the property tests.
    #[doc(hidden)]
    pub fn check_invariants(&self) {
        for side in [&self.bid, &self.ask] {
            let snap = side.snapshot(&self.arena);
            assert_eq!(snap.len() as i64, side.order_count());
            let levels = side.depth(usize::MAX);
            assert_eq!(levels.len() as i64, side.depth_count());
            assert_eq!(side.price_count(), side.depth_count());
            let mut depth_total = Decimal::ZERO;
            let mut depth_count = 0i64;
            for level in &levels {
                depth_total += level.size;
                depth_count += level.count;
            }
            assert_eq!(depth_count, side.order_count());
            let snap_total: Decimal = snap.iter().map(|o| o.size).sum();
            assert_eq!(depth_total, snap_total);
        }
        assert_eq!(
            self.arena.allocated() as i64,
            self.bid.order_count() + self.ask.order_count()
        );
    }

    /// Fingerprint of book state for determinism tests.
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.best_bid().hash(&mut hasher);
        self.best_ask().hash(&mut hasher);
        self.bid.order_count().hash(&mut hasher);
        self.ask.order_count().hash(&mut hasher);
        self.seq_id.hash(&mut hasher);
        self.trade_id.hash(&mut hasher);
        hasher.finish()
    }
}

impl EventHandler<InputEvent> for OrderBook {
    fn on_event(&mut self, event: InputEvent) {
        self.process_command(event.cmd);
    }
}
