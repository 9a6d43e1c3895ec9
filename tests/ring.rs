//! Ring-buffer concurrency properties: exactly-once in-order delivery
//! under producer contention, and cooperative shutdown draining.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ringbook::{
    Engine, EngineConfig, EventHandler, LogType, MemoryLog, OrderType, PlaceOrderCommand,
    RingBuffer, Side,
};

struct Collect(Vec<u64>);

impl EventHandler<u64> for Collect {
    fn on_event(&mut self, event: u64) {
        self.0.push(event);
    }
}

#[test]
fn multi_producer_exactly_once_in_claim_order() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 5_000;

    let ring = Arc::new(RingBuffer::<u64>::with_capacity(1_024));

    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let mut handler = Collect(Vec::new());
            ring.run(&mut handler);
            handler.0
        })
    };

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let ring = Arc::clone(&ring);
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                ring.push(p * 1_000_000 + i).unwrap();
            }
        }));
    }
    for handle in producers {
        handle.join().unwrap();
    }
    ring.shutdown(Duration::from_secs(10)).unwrap();
    let seen = consumer.join().unwrap();

    // every committed event exactly once
    assert_eq!(seen.len(), (PRODUCERS * PER_PRODUCER) as usize);
    let unique: HashSet<u64> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len());

    // each producer's events arrive in its own push order
    let mut last = vec![None::<u64>; PRODUCERS as usize];
    for value in &seen {
        let p = (value / 1_000_000) as usize;
        let i = value % 1_000_000;
        if let Some(prev) = last[p] {
            assert!(i > prev, "producer {p} reordered: {i} after {prev}");
        }
        last[p] = Some(i);
    }
    for (p, l) in last.iter().enumerate() {
        assert_eq!(*l, Some(PER_PRODUCER - 1), "producer {p} lost events");
    }

    assert_eq!(ring.consumer_seq(), (PRODUCERS * PER_PRODUCER) as i64 - 1);
}

#[test]
fn shutdown_drains_backlog_enqueued_before_consumer_starts() {
    let ring = Arc::new(RingBuffer::<u64>::with_capacity(256));
    for i in 0..100 {
        ring.push(i).unwrap();
    }

    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let mut handler = Collect(Vec::new());
            ring.run(&mut handler);
            handler.0
        })
    };

    ring.shutdown(Duration::from_secs(10)).unwrap();
    let seen = consumer.join().unwrap();
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
    assert_eq!(ring.pending(), 0);
}

#[test]
fn producers_wait_when_full_then_complete() {
    // tiny ring: producers must block on the consumer to make space
    let ring = Arc::new(RingBuffer::<u64>::with_capacity(8));

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for i in 0..1_000 {
                ring.push(i).unwrap();
            }
        })
    };

    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let mut handler = Collect(Vec::new());
            ring.run(&mut handler);
            handler.0
        })
    };

    producer.join().unwrap();
    ring.shutdown(Duration::from_secs(10)).unwrap();
    let seen = consumer.join().unwrap();
    assert_eq!(seen, (0..1_000).collect::<Vec<_>>());
}

#[test]
fn engine_serializes_concurrent_producers() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 250;

    let sink = MemoryLog::new();
    let engine = Arc::new(
        Engine::start(EngineConfig::new("BTC-USD"), Box::new(sink.clone())).unwrap(),
    );

    let mut handles = Vec::new();
    for p in 0..PRODUCERS {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                // non-crossing bids on a per-producer price band
                let cmd = PlaceOrderCommand {
                    order_id: format!("p{p}-{i}"),
                    side: Side::Buy,
                    order_type: OrderType::Limit,
                    price: format!("{}", 1_000 + p * 100 + (i % 50)),
                    size: "1".into(),
                    user_id: p as i64,
                    timestamp: 1_700_000_000,
                    ..Default::default()
                };
                engine.place_order(&cmd).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    let engine = Arc::into_inner(engine).unwrap();
    engine.shutdown(Duration::from_secs(10)).unwrap();

    let logs = sink.records();
    assert_eq!(logs.len(), PRODUCERS * PER_PRODUCER);
    for log in &logs {
        assert_eq!(log.log_type, LogType::Open);
    }
    // the single consumer stamps a strictly monotonic sequence
    for pair in logs.windows(2) {
        assert!(pair[1].seq_id > pair[0].seq_id);
    }
}
