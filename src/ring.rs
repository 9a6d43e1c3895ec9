//! Lock-free MPSC ring buffer (disruptor pattern).
//!
//! Producers claim slots with a CAS loop over `producer_seq`, write the
//! slot, then publish by storing the sequence into the slot's marker.
//! A single consumer walks sequences in order, spinning on the marker
//! before reading, so it observes every committed event exactly once and
//! never sees a gap. Contention is resolved by cooperative yield; there
//! are no blocking primitives anywhere on this path.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Default slot count; must be a power of two
pub const RING_CAPACITY: usize = 65_536;

/// Sequence counters start here; also the "empty" publish marker
const NULL_SEQ: i64 = -1;

/// Ring buffer failures visible to producers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RingError {
    /// The buffer is shut down; no slot will be granted
    #[error("ring buffer is shut down; no slot available")]
    NoSlot,
    /// The consumer did not drain before the deadline
    #[error("shutdown deadline exceeded")]
    ShutdownTimeout,
}

/// Consumer-side callback invoked for every event in sequence order.
pub trait EventHandler<T> {
    fn on_event(&mut self, event: T);
}

/// Keep the two hot counters on their own cache lines.
#[repr(align(64))]
struct PaddedCounter(AtomicI64);

/// Bounded multi-producer single-consumer queue.
pub struct RingBuffer<T> {
    /// Highest claimed slot
    producer_seq: PaddedCounter,
    /// Highest fully processed slot
    consumer_seq: PaddedCounter,
    shut_down: AtomicBool,
    capacity: i64,
    mask: i64,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Per-slot published-sequence markers; `NULL_SEQ` while empty
    published: Box<[AtomicI64]>,
}

// Safety: slots are handed between threads only through the claim/publish
// protocol; a slot is written by exactly one producer and read by the one
// consumer after the publish marker is observed.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T: Send> RingBuffer<T> {
    pub fn new() -> Self {
        Self::with_capacity(RING_CAPACITY)
    }

    /// # Panics
    /// Panics unless `capacity` is a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity > 0 && capacity.is_power_of_two(),
            "capacity must be a power of two"
        );
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let published = (0..capacity)
            .map(|_| AtomicI64::new(NULL_SEQ))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            producer_seq: PaddedCounter(AtomicI64::new(NULL_SEQ)),
            consumer_seq: PaddedCounter(AtomicI64::new(NULL_SEQ)),
            shut_down: AtomicBool::new(false),
            capacity: capacity as i64,
            mask: capacity as i64 - 1,
            slots,
            published,
        }
    }

    /// Claim the next slot, move `value` into it and publish it.
    ///
    /// Spins (with yield) while the buffer is full; fails only once the
    /// buffer is shutting down.
    pub fn push(&self, value: T) -> Result<i64, RingError> {
        let seq = self.next_seq()?;
        let index = (seq & self.mask) as usize;
        // Safety: the claim grants this thread exclusive ownership of the
        // slot until the publish marker is set; the consumer cannot pass
        // an unpublished sequence and producers cannot reclaim it until
        // the consumer does.
        unsafe { (*self.slots[index].get()).write(value) };
        self.commit(seq);
        Ok(seq)
    }

    /// CAS claim loop over `producer_seq`.
    fn next_seq(&self) -> Result<i64, RingError> {
        loop {
            if self.shut_down.load(Ordering::SeqCst) {
                return Err(RingError::NoSlot);
            }
            let current = self.producer_seq.0.load(Ordering::Acquire);
            let next = current + 1;
            let wrap_point = next - self.capacity;
            if wrap_point >= self.consumer_seq.0.load(Ordering::Acquire) {
                // full; wait for the consumer
                std::thread::yield_now();
                continue;
            }
            if self
                .producer_seq
                .0
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(next);
            }
            std::thread::yield_now();
        }
    }

    /// Release fence: the slot write happens-before any consumer that
    /// observes this marker.
    fn commit(&self, seq: i64) {
        self.published[(seq & self.mask) as usize].store(seq, Ordering::Release);
    }

    /// Consume events in sequence order until shutdown, then drain.
    ///
    /// Must only ever run on one thread at a time.
    pub fn run<H: EventHandler<T>>(&self, handler: &mut H) {
        let mut next = self.consumer_seq.0.load(Ordering::Acquire) + 1;
        loop {
            if self.shut_down.load(Ordering::SeqCst) {
                self.drain(next, handler);
                return;
            }
            let produced = self.producer_seq.0.load(Ordering::Acquire);
            if next <= produced {
                self.consume_one(next, handler);
                next += 1;
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Process every slot claimed before shutdown was observed.
    fn drain<H: EventHandler<T>>(&self, mut next: i64, handler: &mut H) {
        let produced = self.producer_seq.0.load(Ordering::Acquire);
        while next <= produced {
            self.consume_one(next, handler);
            next += 1;
        }
    }

    fn consume_one<H: EventHandler<T>>(&self, seq: i64, handler: &mut H) {
        let index = (seq & self.mask) as usize;
        // spin until the producer's commit lands
        while self.published[index].load(Ordering::Acquire) != seq {
            std::hint::spin_loop();
        }
        // Safety: the acquire load above pairs with the producer's release
        // store in `commit`, so the slot write is visible; ownership of the
        // value transfers to the handler and the slot becomes vacant.
        let event = unsafe { (*self.slots[index].get()).assume_init_read() };
        handler.on_event(event);
        self.consumer_seq.0.store(seq, Ordering::Release);
    }

    /// Flip the shutdown flag without waiting.
    pub fn request_shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    /// Flag shutdown, then wait until the consumer has drained everything
    /// claimed up to this moment, or the deadline fires.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), RingError> {
        self.shut_down.store(true, Ordering::SeqCst);
        let target = self.producer_seq.0.load(Ordering::Acquire);
        let deadline = Instant::now() + timeout;
        while self.consumer_seq.0.load(Ordering::Acquire) < target {
            if Instant::now() >= deadline {
                return Err(RingError::ShutdownTimeout);
            }
            std::thread::yield_now();
        }
        Ok(())
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn producer_seq(&self) -> i64 {
        self.producer_seq.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn consumer_seq(&self) -> i64 {
        self.consumer_seq.0.load(Ordering::Acquire)
    }

    /// Claimed-but-unprocessed event count.
    #[inline]
    pub fn pending(&self) -> i64 {
        self.producer_seq() - self.consumer_seq()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }
}

impl<T: Send> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // drop any published-but-unconsumed values
        let consumed = *self.consumer_seq.0.get_mut();
        let produced = *self.producer_seq.0.get_mut();
        let mut seq = consumed + 1;
        while seq <= produced {
            let index = (seq & self.mask) as usize;
            if *self.published[index].get_mut() == seq {
                // Safety: the marker proves the slot holds an initialized
                // value that no consumer took.
                unsafe { (*self.slots[index].get()).assume_init_drop() };
            }
            seq += 1;
        }
    }
}
