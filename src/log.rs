//! Structured log records emitted by the matching core.
//!
//! Every handler invocation appends its records to one batch and pushes
//! the batch to a [`PushLog`] sink exactly once, in `seq_id` order. The
//! batch is borrowed for the duration of the call; a sink that retains
//! records must copy them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::command::{Order, OrderType, Side};

/// Record discriminant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogType {
    Open,
    Match,
    Cancel,
    Amend,
    Reject,
}

/// Why a command was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum RejectReason {
    /// Payload failed to decode or carried unusable values
    InvalidPayload = 1,
    /// The market state does not admit the command
    StateHadDone = 2,
    /// Order id already rests in the book
    DuplicateOrderId = 3,
    /// Nothing left on the opposite side
    NoLiquidity = 4,
    /// Achievable match is below the lot size
    LowSize = 5,
    /// Cancel/amend target does not exist
    OrderNotFound = 6,
    /// Post-only order would take liquidity
    PostOnlyCross = 7,
    /// A backing structure can no longer grow
    Capacity = 8,
}

/// One log record; which optional fields are meaningful depends on `log_type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookLog {
    pub seq_id: i64,
    /// Monotonic per engine, set on `Match` only
    pub trade_id: i64,
    pub log_type: LogType,
    pub market_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    /// `price * size`, set on `Match` only
    pub amount: Decimal,
    pub order_id: String,
    pub user_id: i64,
    pub order_type: OrderType,
    /// Pre-amend values, set on `Amend` only
    pub pre_price: Decimal,
    pub pre_size: Decimal,
    /// Maker attribution, set on `Match` only
    pub maker_order_id: String,
    pub maker_user_id: i64,
    pub reject_reason: Option<RejectReason>,
    /// Command timestamp as supplied by the producer
    pub timestamp: i64,
    /// Engine-side creation time
    pub create_time: DateTime<Utc>,
}

impl OrderBookLog {
    fn base(seq_id: i64, log_type: LogType, market_id: &str) -> Self {
        Self {
            seq_id,
            trade_id: 0,
            log_type,
            market_id: market_id.to_string(),
            side: Side::Buy,
            price: Decimal::ZERO,
            size: Decimal::ZERO,
            amount: Decimal::ZERO,
            order_id: String::new(),
            user_id: 0,
            order_type: OrderType::Limit,
            pre_price: Decimal::ZERO,
            pre_size: Decimal::ZERO,
            maker_order_id: String::new(),
            maker_user_id: 0,
            reject_reason: None,
            timestamp: 0,
            create_time: Utc::now(),
        }
    }

    /// An order (or a fresh iceberg slice) started resting.
    pub fn open(seq_id: i64, market_id: &str, order: &Order) -> Self {
        let mut log = Self::base(seq_id, LogType::Open, market_id);
        log.side = order.side;
        log.price = order.price;
        log.size = order.size;
        log.order_id = order.id.clone();
        log.user_id = order.user_id;
        log.order_type = order.order_type;
        log.timestamp = order.timestamp;
        log
    }

    /// A fill between the aggressing `taker` and the resting `maker`.
    pub fn matched(
        seq_id: i64,
        trade_id: i64,
        market_id: &str,
        taker: &Order,
        maker: &Order,
        price: Decimal,
        size: Decimal,
    ) -> Self {
        let mut log = Self::base(seq_id, LogType::Match, market_id);
        log.trade_id = trade_id;
        log.side = taker.side;
        log.price = price;
        log.size = size;
        log.amount = price * size;
        log.order_id = taker.id.clone();
        log.user_id = taker.user_id;
        log.order_type = taker.order_type;
        log.maker_order_id = maker.id.clone();
        log.maker_user_id = maker.user_id;
        log.timestamp = taker.timestamp;
        log
    }

    /// An order left the book; `size` is the cancelled quantity
    /// (hidden reserve included for icebergs).
    pub fn cancel(seq_id: i64, market_id: &str, order: &Order, size: Decimal) -> Self {
        let mut log = Self::base(seq_id, LogType::Cancel, market_id);
        log.side = order.side;
        log.price = order.price;
        log.size = size;
        log.order_id = order.id.clone();
        log.user_id = order.user_id;
        log.order_type = order.order_type;
        log.timestamp = order.timestamp;
        log
    }

    /// An order was re-priced or re-sized.
    pub fn amend(
        seq_id: i64,
        market_id: &str,
        order: &Order,
        pre_price: Decimal,
        pre_size: Decimal,
    ) -> Self {
        let mut log = Self::base(seq_id, LogType::Amend, market_id);
        log.side = order.side;
        log.price = order.price;
        log.size = order.size;
        log.pre_price = pre_price;
        log.pre_size = pre_size;
        log.order_id = order.id.clone();
        log.user_id = order.user_id;
        log.order_type = order.order_type;
        log.timestamp = order.timestamp;
        log
    }

    /// A command was refused; book state is untouched by the refusal.
    pub fn reject(
        seq_id: i64,
        market_id: &str,
        order_id: &str,
        user_id: i64,
        reason: RejectReason,
        timestamp: i64,
    ) -> Self {
        let mut log = Self::base(seq_id, LogType::Reject, market_id);
        log.order_id = order_id.to_string();
        log.user_id = user_id;
        log.reject_reason = Some(reason);
        log.timestamp = timestamp;
        log
    }
}

/// Downstream sink for log batches.
///
/// Called synchronously on the consumer thread with records ordered by
/// `seq_id`. The batch is only borrowed for the call.
pub trait PushLog: Send {
    fn publish(&mut self, batch: &[OrderBookLog]);
}

/// In-memory sink; deep-copies every batch. Cloning shares the storage,
/// so a test can keep one handle while the engine owns another.
#[derive(Clone, Default)]
pub struct MemoryLog {
    records: Arc<Mutex<Vec<OrderBookLog>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far.
    pub fn records(&self) -> Vec<OrderBookLog> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PushLog for MemoryLog {
    fn publish(&mut self, batch: &[OrderBookLog]) {
        self.records.lock().unwrap().extend_from_slice(batch);
    }
}
