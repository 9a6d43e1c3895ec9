//! # ringbook
//!
//! A deterministic in-memory matching engine for a single trading pair.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: commands come from any number of producers, but
//!   one thread owns the book exclusively (no locks on book state)
//! - **Index Linkage**: orders live in a slab arena and chain through
//!   32-bit indices; the price index is an arena-backed skip list
//! - **Exact Decimals**: every price, size and amount is a fixed-point
//!   decimal; equality is exact
//! - **Batched Output**: each command produces one ordered batch of
//!   structured log records, published synchronously to a pluggable sink
//!
//! ## Architecture
//!
//! ```text
//! [Producer Threads] --> [MPSC Ring Buffer] --> [Consumer Thread]
//!                                                     |
//!                                          [OrderBook + SkipList Index]
//!                                                     |
//!                                              [PushLog batches]
//! ```

pub mod arena;
pub mod book_side;
pub mod codec;
pub mod command;
pub mod engine;
pub mod error;
pub mod log;
pub mod order_book;
pub mod pool;
pub mod price_level;
pub mod ring;
pub mod skiplist;

// Re-exports for convenience
pub use arena::{ArenaIndex, OrderArena, OrderNode, NIL};
pub use book_side::{BookSide, BookError};
pub use command::{
    AmendOrderCommand, CancelOrderCommand, Command, CommandType, InputEvent, Order, OrderBookState,
    OrderDepth, OrderType, PlaceOrderCommand, ResumeMarketCommand, Side, SuspendMarketCommand,
};
pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
pub use log::{LogType, MemoryLog, OrderBookLog, PushLog, RejectReason};
pub use order_book::{OrderBook, DEFAULT_LOT_SIZE};
pub use price_level::PriceLevel;
pub use ring::{EventHandler, RingBuffer, RingError, RING_CAPACITY};
pub use skiplist::SkipList;
