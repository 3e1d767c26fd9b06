//! Integration tests driving the public `txdag` API directly, rather than
//! through `cfg(test)` units colocated with the code under test — there is
//! no HTTP surface in scope to spawn a subprocess against, so these
//! exercise the library crate end to end instead.

use txdag::config::Config;
use txdag::events::{BroadcastEventSink, Event, NoopEventSink};
use txdag::interfaces::ExecutionResult;
use txdag::types::{Height, Txid};
use txdag::Engine;

fn txid(byte: u8) -> Txid {
    Txid::from_bytes([byte; 32])
}

fn engine() -> Engine {
    Engine::open_in_memory(&Config::default(), Box::new(NoopEventSink)).unwrap()
}

#[test]
fn add_new_then_add_new_is_idempotent_end_to_end() {
    let mut e = engine();
    let a = txid(1);
    e.add_new(&a, None).unwrap();
    e.add_new(&a, None).unwrap();
    assert_eq!(e.get_transaction_hex(&a).unwrap(), None);
}

#[test]
fn linear_chain_of_three_becomes_ready_in_dependency_order() {
    let sink = BroadcastEventSink::new(32);
    let mut rx = sink.subscribe();
    let mut e = Engine::open_in_memory(&Config::default(), Box::new(sink)).unwrap();

    let (a, b, c) = (txid(1), txid(2), txid(3));
    for t in [a, b, c] {
        e.trust(&t).unwrap();
        e.add_new(&t, None).unwrap();
    }
    e.store_parsed_executable(&a, b"a", true, &[], &[], &[]).unwrap();
    e.store_parsed_executable(&b, b"b", true, &[a], &[], &[]).unwrap();
    e.store_parsed_executable(&c, b"c", true, &[b], &[], &[]).unwrap();

    let mut ready_order = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::ReadyToExecute(t) = event {
            ready_order.push(t);
        }
    }
    assert_eq!(ready_order, vec![a]);

    e.store_executed(&a, &ExecutionResult::default()).unwrap();
    assert_eq!(rx.try_recv().unwrap(), Event::ReadyToExecute(b));

    e.store_executed(&b, &ExecutionResult::default()).unwrap();
    assert_eq!(rx.try_recv().unwrap(), Event::ReadyToExecute(c));
}

#[test]
fn banning_an_upstream_transaction_blocks_its_downstream_until_unbanned() {
    let sink = BroadcastEventSink::new(32);
    let mut rx = sink.subscribe();
    let mut e = Engine::open_in_memory(&Config::default(), Box::new(sink)).unwrap();

    let (a, b) = (txid(1), txid(2));
    e.trust(&a).unwrap();
    e.trust(&b).unwrap();
    e.add_new(&a, None).unwrap();
    e.add_new(&b, None).unwrap();
    e.store_parsed_executable(&a, b"a", true, &[], &[], &[]).unwrap();
    e.store_parsed_executable(&b, b"b", true, &[a], &[], &[]).unwrap();
    while rx.try_recv().is_ok() {}

    e.ban(&a).unwrap();
    assert!(e.is_banned(&a));
    assert!(rx.try_recv().is_err(), "a banned root must never announce ready");

    e.unban(&a).unwrap();
    assert!(!e.is_banned(&a));
    assert_eq!(rx.try_recv().unwrap(), Event::ReadyToExecute(a));
}

#[test]
fn reorg_rewind_deletes_above_fork_point_and_keeps_earlier_state() {
    let mut e = engine();
    let (a, b, c) = (txid(1), txid(2), txid(3));
    e.add_new(&a, Some(Height::Confirmed(10))).unwrap();
    e.add_new(&b, Some(Height::Confirmed(11))).unwrap();
    e.add_new(&c, Some(Height::Confirmed(12))).unwrap();
    e.store_parsed_executable(&a, b"a", false, &[], &[], &[]).unwrap();
    e.store_parsed_executable(&b, b"b", false, &[a], &[], &[]).unwrap();
    e.store_parsed_executable(&c, b"c", false, &[b], &[], &[]).unwrap();
    e.set_height_and_hash(12, "tip-12").unwrap();

    e.rewind_above(10, "tip-10").unwrap();

    assert_eq!(e.get_height().unwrap(), Some(10));
    assert_eq!(e.get_transaction_hex(&a).unwrap(), Some("61".to_string()));
    assert_eq!(e.get_transaction_hex(&b).unwrap(), None);
    assert_eq!(e.get_transaction_hex(&c).unwrap(), None);
}

#[test]
fn execution_failure_of_a_code_bearing_root_cascades_to_all_descendants() {
    let mut e = engine();
    let (a, b, c) = (txid(1), txid(2), txid(3));
    for t in [a, b, c] {
        e.trust(&t).unwrap();
        e.add_new(&t, None).unwrap();
    }
    e.store_parsed_executable(&a, b"a", true, &[], &[], &[]).unwrap();
    e.store_parsed_executable(&b, b"b", true, &[a], &[], &[]).unwrap();
    e.store_parsed_executable(&c, b"c", true, &[b], &[], &[]).unwrap();

    e.set_execution_failed(&a).unwrap();

    assert_eq!(e.num_queued_for_execution(), 0);
    for t in [a, b, c] {
        assert!(e.get_transaction_hex(&t).unwrap().is_some());
    }
}
