//! Engine - producer facade plus the single consumer thread.
//!
//! Producers on any thread serialize commands and push them into the ring
//! buffer; one dedicated (optionally core-pinned) thread owns the
//! [`OrderBook`] and drains the ring in sequence order. Shutdown is
//! cooperative: flag, wait for the drain, join.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::codec;
use crate::command::{
    AmendOrderCommand, CancelOrderCommand, Command, CommandType, InputEvent, PlaceOrderCommand,
    ResumeMarketCommand, SuspendMarketCommand,
};
use crate::error::EngineError;
use crate::log::PushLog;
use crate::order_book::{OrderBook, DEFAULT_LOT_SIZE};
use crate::ring::{RingBuffer, RING_CAPACITY};

/// Construction-time knobs for [`Engine::start`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub market_id: String,
    pub lot_size: Decimal,
    /// Ring slot count; must be a power of two
    pub ring_capacity: usize,
    /// Seed for the price-index level geometry
    pub price_seed: u64,
    /// Pin the consumer to the last CPU core
    pub pin_consumer: bool,
}

impl EngineConfig {
    pub fn new(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            lot_size: DEFAULT_LOT_SIZE,
            ring_capacity: RING_CAPACITY,
            price_seed: 1,
            pin_consumer: false,
        }
    }
}

/// A running matching engine for one market.
pub struct Engine {
    market_id: String,
    ring: Arc<RingBuffer<InputEvent>>,
    consumer: Option<JoinHandle<()>>,
}

impl Engine {
    /// Build the book, spawn the consumer thread and start accepting
    /// commands.
    pub fn start(config: EngineConfig, sink: Box<dyn PushLog>) -> Result<Self, EngineError> {
        let ring = Arc::new(RingBuffer::with_capacity(config.ring_capacity));
        let mut book = OrderBook::with_options(
            config.market_id.clone(),
            sink,
            config.lot_size,
            config.price_seed,
        );
        let consumer_ring = Arc::clone(&ring);
        let pin = config.pin_consumer;
        let consumer = std::thread::Builder::new()
            .name(format!("{}-matcher", config.market_id))
            .spawn(move || {
                if pin {
                    pin_to_last_core();
                }
                consumer_ring.run(&mut book);
                book.halt();
            })?;
        tracing::info!(market = %config.market_id, "matching engine started");
        Ok(Self {
            market_id: config.market_id,
            ring,
            consumer: Some(consumer),
        })
    }

    /// Enqueue a place command.
    pub fn place_order(&self, cmd: &PlaceOrderCommand) -> Result<(), EngineError> {
        if cmd.order_id.is_empty() {
            return Err(EngineError::InvalidArgument("empty order id"));
        }
        self.enqueue(CommandType::PlaceOrder, cmd)
    }

    /// Enqueue an amend command.
    pub fn amend_order(&self, cmd: &AmendOrderCommand) -> Result<(), EngineError> {
        if cmd.order_id.is_empty() {
            return Err(EngineError::InvalidArgument("empty order id"));
        }
        self.enqueue(CommandType::AmendOrder, cmd)
    }

    /// Enqueue a cancel command.
    pub fn cancel_order(&self, cmd: &CancelOrderCommand) -> Result<(), EngineError> {
        if cmd.order_id.is_empty() {
            return Err(EngineError::InvalidArgument("empty order id"));
        }
        self.enqueue(CommandType::CancelOrder, cmd)
    }

    /// Enqueue a market suspension.
    pub fn suspend_market(&self, cmd: &SuspendMarketCommand) -> Result<(), EngineError> {
        self.enqueue(CommandType::SuspendMarket, cmd)
    }

    /// Enqueue a market resumption.
    pub fn resume_market(&self, cmd: &ResumeMarketCommand) -> Result<(), EngineError> {
        self.enqueue(CommandType::ResumeMarket, cmd)
    }

    fn enqueue<T: Serialize>(&self, cmd_type: CommandType, payload: &T) -> Result<(), EngineError> {
        if self.ring.is_shut_down() {
            return Err(EngineError::ShuttingDown);
        }
        let payload = codec::encode(payload)?;
        let cmd = Command {
            market_id: self.market_id.clone(),
            cmd_type,
            payload,
            metadata: None,
        };
        self.ring.push(InputEvent { cmd })?;
        Ok(())
    }

    #[inline]
    pub fn market_id(&self) -> &str {
        &self.market_id
    }

    /// Commands claimed but not yet processed.
    #[inline]
    pub fn pending(&self) -> i64 {
        self.ring.pending()
    }

    /// Stop admitting commands, wait for the consumer to drain everything
    /// enqueued so far, then join the thread.
    pub fn shutdown(mut self, timeout: Duration) -> Result<(), EngineError> {
        self.ring.shutdown(timeout)?;
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }
        tracing::info!(market = %self.market_id, "matching engine stopped");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // dropped without an explicit shutdown: stop the consumer anyway
        self.ring.request_shutdown();
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }
    }
}

/// The last core is the one most often isolated from OS noise.
fn pin_to_last_core() {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(last) = core_ids.last() {
            core_affinity::set_for_current(*last);
        }
    }
}
