//! Criterion latency benchmarks over the synchronous dispatch path.
//!
//! Measures place (resting), place (full match), cancel and a mixed
//! workload. Commands are pre-encoded so the codec cost is included but
//! command construction is not.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use ringbook::{
    codec, CancelOrderCommand, Command, CommandType, MemoryLog, OrderBook, OrderType,
    PlaceOrderCommand, Side, DEFAULT_LOT_SIZE,
};

const MARKET: &str = "BTC-USD";

/// Sink that drops every batch; keeps the benches about the book.
struct NullSink;

impl ringbook::PushLog for NullSink {
    fn publish(&mut self, _batch: &[ringbook::OrderBookLog]) {}
}

fn fresh_book() -> OrderBook {
    OrderBook::with_options(MARKET, Box::new(NullSink), DEFAULT_LOT_SIZE, 42)
}

fn place_cmd(id: &str, side: Side, price: i64, size: u32) -> Command {
    Command {
        market_id: MARKET.into(),
        cmd_type: CommandType::PlaceOrder,
        payload: codec::encode(&PlaceOrderCommand {
            order_id: id.to_string(),
            side,
            order_type: OrderType::Limit,
            price: price.to_string(),
            size: size.to_string(),
            user_id: 1,
            timestamp: 1_700_000_000,
            ..Default::default()
        })
        .unwrap(),
        metadata: None,
    }
}

fn cancel_cmd(id: &str) -> Command {
    Command {
        market_id: MARKET.into(),
        cmd_type: CommandType::CancelOrder,
        payload: codec::encode(&CancelOrderCommand {
            order_id: id.to_string(),
            user_id: 1,
            timestamp: 1_700_000_000,
        })
        .unwrap(),
        metadata: None,
    }
}

fn bench_place_no_match(c: &mut Criterion) {
    let mut book = fresh_book();
    let mut order_id = 0u64;

    c.bench_function("place_no_match", |b| {
        b.iter(|| {
            order_id += 1;
            let cmd = place_cmd(&format!("o{order_id}"), Side::Buy, 9_000, 100);
            black_box(book.process_command(cmd));
        })
    });
}

fn bench_place_full_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("place_full_match");

    for depth in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let mut book = fresh_book();
            for i in 0..depth {
                book.process_command(place_cmd(&format!("seed{i}"), Side::Sell, 10_000, 100));
            }
            let mut order_id = 1_000u64;

            b.iter(|| {
                order_id += 1;
                let taker = place_cmd(&format!("t{order_id}"), Side::Buy, 10_000, 100);
                book.process_command(taker);
                // replenish the consumed maker
                book.process_command(place_cmd(
                    &format!("m{order_id}"),
                    Side::Sell,
                    10_000,
                    100,
                ));
            })
        });
    }
    group.finish();
}

fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel");

    for book_size in [100usize, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(book_size),
            &book_size,
            |b, &book_size| {
                let mut book = fresh_book();
                for i in 0..book_size {
                    let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = if i % 2 == 0 {
                        9_000 + (i % 100) as i64 * 10
                    } else {
                        11_000 + (i % 100) as i64 * 10
                    };
                    book.process_command(place_cmd(&format!("o{i}"), side, price, 100));
                }
                let mut cancel_id = 0usize;
                let mut next_id = book_size;

                b.iter(|| {
                    book.process_command(cancel_cmd(&format!("o{cancel_id}")));
                    // replenish so the book size stays constant
                    let side = if cancel_id % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = if cancel_id % 2 == 0 {
                        9_000 + (cancel_id % 100) as i64 * 10
                    } else {
                        11_000 + (cancel_id % 100) as i64 * 10
                    };
                    book.process_command(place_cmd(&format!("o{next_id}"), side, price, 100));
                    cancel_id = next_id;
                    next_id += 1;
                })
            },
        );
    }
    group.finish();
}

fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_workload");

    group.bench_function("70_place_30_cancel", |b| {
        let sink = MemoryLog::new();
        let mut book = OrderBook::with_options(MARKET, Box::new(sink), DEFAULT_LOT_SIZE, 42);
        let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF);
        let mut order_id = 0u64;

        // pre-populate
        for _ in 0..1_000 {
            order_id += 1;
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            book.process_command(place_cmd(
                &format!("o{order_id}"),
                side,
                rng.gen_range(9_900..10_100),
                rng.gen_range(1..1_000),
            ));
        }

        b.iter(|| {
            if rng.gen_bool(0.7) {
                order_id += 1;
                let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                book.process_command(place_cmd(
                    &format!("o{order_id}"),
                    side,
                    rng.gen_range(9_900..10_100),
                    rng.gen_range(1..1_000),
                ));
            } else {
                let target = rng.gen_range(1..=order_id);
                book.process_command(cancel_cmd(&format!("o{target}")));
            }
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_place_no_match,
    bench_place_full_match,
    bench_cancel,
    bench_mixed_workload,
);
criterion_main!(benches);
