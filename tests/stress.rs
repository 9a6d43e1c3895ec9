//! Stress - correctness under churn, contention and iceberg cycling.

use ringbook::{
    codec, CancelOrderCommand, Command, CommandType, LogType, MemoryLog, OrderBook, OrderType,
    PlaceOrderCommand, Side, DEFAULT_LOT_SIZE,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MARKET: &str = "BTC-USD";

fn book() -> (OrderBook, MemoryLog) {
    let sink = MemoryLog::new();
    let book = OrderBook::with_options(MARKET, Box::new(sink.clone()), DEFAULT_LOT_SIZE, 11);
    (book, sink)
}

fn place(book: &mut OrderBook, payload: PlaceOrderCommand) {
    book.process_command(Command {
        market_id: MARKET.into(),
        cmd_type: CommandType::PlaceOrder,
        payload: codec::encode(&payload).unwrap(),
        metadata: None,
    });
}

fn limit(book: &mut OrderBook, id: &str, side: Side, price: &str, size: &str) {
    place(
        book,
        PlaceOrderCommand {
            order_id: id.to_string(),
            side,
            order_type: OrderType::Limit,
            price: price.to_string(),
            size: size.to_string(),
            user_id: 1,
            timestamp: 1_700_000_000,
            ..Default::default()
        },
    );
}

fn cancel(book: &mut OrderBook, id: &str) {
    book.process_command(Command {
        market_id: MARKET.into(),
        cmd_type: CommandType::CancelOrder,
        payload: codec::encode(&CancelOrderCommand {
            order_id: id.to_string(),
            user_id: 1,
            timestamp: 1_700_000_000,
        })
        .unwrap(),
        metadata: None,
    });
}

#[test]
fn single_level_contention_fifo() {
    const ORDERS: usize = 1_000;
    let (mut book, sink) = book();

    for i in 0..ORDERS {
        limit(&mut book, &format!("a{i}"), Side::Sell, "100", "10");
    }
    assert_eq!(book.order_count(), ORDERS as i64);
    assert_eq!(book.depth(Side::Sell, 2).len(), 1);

    // one sweep takes the whole level in arrival order
    limit(
        &mut book,
        "taker",
        Side::Buy,
        "100",
        &(ORDERS * 10).to_string(),
    );

    let makers: Vec<String> = sink
        .records()
        .iter()
        .filter(|l| l.log_type == LogType::Match)
        .map(|l| l.maker_order_id.clone())
        .collect();
    assert_eq!(makers.len(), ORDERS);
    for (i, maker) in makers.iter().enumerate() {
        assert_eq!(maker, &format!("a{i}"));
    }
    assert_eq!(book.order_count(), 0);
    book.check_invariants();
}

#[test]
fn rapid_place_cancel_cycles() {
    const CYCLES: usize = 10_000;
    let (mut book, sink) = book();

    for cycle in 0..CYCLES {
        let id = format!("c{cycle}");
        let side = if cycle % 2 == 0 { Side::Buy } else { Side::Sell };
        let price = if cycle % 2 == 0 { "99" } else { "101" };
        limit(&mut book, &id, side, price, "5");
        cancel(&mut book, &id);
    }

    assert_eq!(book.order_count(), 0);
    assert_eq!(book.best_bid(), None);
    assert_eq!(book.best_ask(), None);
    assert_eq!(sink.len(), CYCLES * 2);
    book.check_invariants();
}

#[test]
fn iceberg_cycles_until_reserve_is_dry() {
    let (mut book, sink) = book();
    // 100 total, visible in slices of 10
    place(
        &mut book,
        PlaceOrderCommand {
            order_id: "berg".into(),
            side: Side::Sell,
            order_type: OrderType::Limit,
            price: "100".into(),
            size: "100".into(),
            visible_limit: "10".into(),
            user_id: 1,
            timestamp: 1_700_000_000,
            ..Default::default()
        },
    );

    // ten full takes drain the whole reserve
    for i in 0..10 {
        limit(&mut book, &format!("t{i}"), Side::Buy, "100", "10");
    }

    let logs = sink.records();
    let opens = logs.iter().filter(|l| l.log_type == LogType::Open).count();
    let fills: Decimal = logs
        .iter()
        .filter(|l| l.log_type == LogType::Match)
        .map(|l| l.size)
        .sum();
    assert_eq!(fills, dec!(100));
    assert_eq!(opens, 10); // initial slice + nine refills
    assert_eq!(book.order_count(), 0);

    // an eleventh take finds nothing
    limit(&mut book, "t10", Side::Buy, "100", "10");
    assert_eq!(book.order_count(), 1);
    assert_eq!(book.best_bid(), Some(dec!(100)));
    book.check_invariants();
}

#[test]
fn iceberg_maker_behind_other_orders_refills_to_tail() {
    let (mut book, sink) = book();
    place(
        &mut book,
        PlaceOrderCommand {
            order_id: "berg".into(),
            side: Side::Sell,
            order_type: OrderType::Limit,
            price: "100".into(),
            size: "20".into(),
            visible_limit: "5".into(),
            user_id: 1,
            timestamp: 1_700_000_000,
            ..Default::default()
        },
    );
    limit(&mut book, "plain", Side::Sell, "100", "5");

    // takes the berg slice first (arrival order), refill goes behind plain
    limit(&mut book, "t0", Side::Buy, "100", "5");
    limit(&mut book, "t1", Side::Buy, "100", "5");

    let makers: Vec<String> = sink
        .records()
        .iter()
        .filter(|l| l.log_type == LogType::Match)
        .map(|l| l.maker_order_id.clone())
        .collect();
    assert_eq!(makers, vec!["berg", "plain"]);
    book.check_invariants();
}

#[test]
fn arena_slots_recycle_through_heavy_churn() {
    const ROUNDS: usize = 5;
    const ORDERS: usize = 2_000;
    let (mut book, _sink) = book();

    for round in 0..ROUNDS {
        for i in 0..ORDERS {
            let id = format!("r{round}-{i}");
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            let price = if i % 2 == 0 {
                format!("{}", 900 + i % 50)
            } else {
                format!("{}", 1100 + i % 50)
            };
            limit(&mut book, &id, side, &price, "3");
        }
        assert_eq!(book.order_count(), ORDERS as i64);
        for i in 0..ORDERS {
            cancel(&mut book, &format!("r{round}-{i}"));
        }
        assert_eq!(book.order_count(), 0);
        book.check_invariants();
    }
}

#[test]
fn deep_book_market_sweep() {
    const LEVELS: usize = 500;
    let (mut book, sink) = book();

    for i in 0..LEVELS {
        limit(
            &mut book,
            &format!("a{i}"),
            Side::Sell,
            &format!("{}", 1_000 + i),
            "2",
        );
    }

    place(
        &mut book,
        PlaceOrderCommand {
            order_id: "sweep".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            price: "0".into(),
            size: (LEVELS * 2).to_string(),
            user_id: 2,
            timestamp: 1_700_000_000,
            ..Default::default()
        },
    );

    let fills: Vec<Decimal> = sink
        .records()
        .iter()
        .filter(|l| l.log_type == LogType::Match)
        .map(|l| l.price)
        .collect();
    assert_eq!(fills.len(), LEVELS);
    // strictly ascending sweep through the ask ladder
    for pair in fills.windows(2) {
        assert!(pair[1] > pair[0]);
    }
    assert_eq!(book.order_count(), 0);
    book.check_invariants();
}

#[test]
fn ioc_storm_leaves_book_unchanged() {
    let (mut book, _sink) = book();
    for i in 0..100 {
        limit(
            &mut book,
            &format!("a{i}"),
            Side::Sell,
            &format!("{}", 1_000 + i % 20),
            "10",
        );
    }
    let shape = |book: &OrderBook| {
        (
            book.best_bid(),
            book.best_ask(),
            book.order_count(),
            book.depth(Side::Sell, usize::MAX),
        )
    };
    let before = shape(&book);

    // none of these cross
    for i in 0..200 {
        place(
            &mut book,
            PlaceOrderCommand {
                order_id: format!("ioc{i}"),
                side: Side::Buy,
                order_type: OrderType::Ioc,
                price: "900".into(),
                size: "50".into(),
                user_id: 2,
                timestamp: 1_700_000_000,
                ..Default::default()
            },
        );
    }

    assert_eq!(book.order_count(), 100);
    assert_eq!(shape(&book), before);
    book.check_invariants();
}

#[test]
fn fok_mixed_fill_and_reject() {
    let (mut book, _sink) = book();
    for i in 0..100 {
        limit(&mut book, &format!("a{i}"), Side::Sell, "100", "100");
    }
    // total resting: 10_000

    let resting = |book: &OrderBook| -> Decimal {
        book.depth(Side::Sell, usize::MAX).iter().map(|l| l.size).sum()
    };

    let mut filled = 0;
    let mut rejected = 0;
    for i in 0..100 {
        let qty = i * 50 + 10;
        let before = resting(&book);
        place(
            &mut book,
            PlaceOrderCommand {
                order_id: format!("f{i}"),
                side: Side::Buy,
                order_type: OrderType::Fok,
                price: "100".into(),
                size: qty.to_string(),
                user_id: 2,
                timestamp: 1_700_000_000,
                ..Default::default()
            },
        );
        let after = resting(&book);
        if after < before {
            // a fill-or-kill either takes everything it asked for...
            assert_eq!(before - after, Decimal::from(qty));
            filled += 1;
        } else {
            // ...or nothing at all
            assert_eq!(before, after);
            rejected += 1;
        }
    }

    assert!(filled > 0, "some FOK orders must fill");
    assert!(rejected > 0, "some FOK orders must reject");
    book.check_invariants();
}
