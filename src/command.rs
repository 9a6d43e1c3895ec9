//! Command vocabulary and core market types.
//!
//! Commands arrive from producer threads as serialized payloads wrapped in
//! a [`Command`] envelope; the consumer thread decodes and dispatches them.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Order side (buy = bid, sell = ask)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    #[default]
    Buy = 1,
    /// Sell side (asks)
    Sell = 2,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type determines matching behavior
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    /// Consume opposing liquidity at any price, by base size or quote notional
    Market,
    /// Rest in the book if not fully matched (default)
    #[default]
    Limit,
    /// Immediate-Or-Cancel - cancel any unfilled portion instead of resting
    Ioc,
    /// Fill-Or-Kill - all-or-nothing execution, reject if it cannot fully fill
    Fok,
    /// Maker-only - reject instead of taking liquidity
    PostOnly,
    /// Reserved; not a placement
    Cancel,
}

/// Engine state for a single market
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderBookState {
    #[default]
    Running,
    Paused,
    /// Terminal
    Stopped,
}

/// A resting or in-flight order.
///
/// Chain linkage (`prev`/`next` within a price level) lives in the arena
/// node that stores the order, not here; see [`crate::arena::OrderNode`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub side: Side,
    pub price: Decimal,
    /// Remaining visible quantity
    pub size: Decimal,
    pub order_type: OrderType,
    pub user_id: i64,
    pub timestamp: i64,
    /// Iceberg chunk size; zero for plain orders
    pub visible_limit: Decimal,
    /// Iceberg reserve not yet exposed
    pub hidden_size: Decimal,
}

/// One aggregated price level, best-first, as returned by depth queries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderDepth {
    pub price: Decimal,
    pub size: Decimal,
    pub count: i64,
}

/// Discriminant of the serialized payload inside a [`Command`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    SuspendMarket = 2,
    ResumeMarket = 3,
    PlaceOrder = 10,
    CancelOrder = 11,
    AmendOrder = 12,
}

/// Envelope carried through the ring buffer.
///
/// The core never inspects `payload` except through the codec.
#[derive(Clone, Debug)]
pub struct Command {
    pub market_id: String,
    pub cmd_type: CommandType,
    pub payload: Vec<u8>,
    pub metadata: Option<FxHashMap<String, String>>,
}

/// One ring-buffer slot worth of input
#[derive(Clone, Debug)]
pub struct InputEvent {
    pub cmd: Command,
}

/// Place a new order.
///
/// Decimal fields travel as strings so the codec never loses precision;
/// `visible_limit` and `quote_size` are optional and default to empty
/// (parsed leniently as zero).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderCommand {
    pub order_id: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: String,
    pub size: String,
    #[serde(default)]
    pub visible_limit: String,
    #[serde(default)]
    pub quote_size: String,
    pub user_id: i64,
    pub timestamp: i64,
}

/// Cancel a resting order by id
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderCommand {
    pub order_id: String,
    pub user_id: i64,
    pub timestamp: i64,
}

/// Re-price or re-size a resting order
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmendOrderCommand {
    pub order_id: String,
    pub user_id: i64,
    pub new_price: String,
    pub new_size: String,
    pub timestamp: i64,
}

/// Halt matching; resting orders stay put
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendMarketCommand {
    pub user_id: i64,
    pub market_id: String,
    #[serde(default)]
    pub reason: String,
}

/// Resume a suspended market
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeMarketCommand {
    pub user_id: i64,
    pub market_id: String,
}
