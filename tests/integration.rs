//! Integration tests for the client over the in-memory store.

mod common;

use common::init_tracing;
use eventline::{
    Client, ClientConfig, ClientError, Credentials, EventData, ExpectedVersion, MemoryStore,
    OperationResult, Position, ReadParams, SequenceState, STREAM_END,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::thread;
use std::time::Duration;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct OrderLine {
    sku: String,
    quantity: u32,
}

fn connect(store: &MemoryStore) -> Client {
    init_tracing();
    Client::connect(store, ClientConfig::default()).unwrap()
}

fn line(sku: &str, quantity: u32) -> EventData {
    EventData::json("LineAdded", &OrderLine { sku: sku.to_string(), quantity }).unwrap()
}

// --- Realistic Workflow Tests ---

#[test]
fn test_rebuild_state_from_range() {
    let store = MemoryStore::new();
    let client = connect(&store);

    client
        .write_events(
            "orders-1",
            ExpectedVersion::NoStream,
            false,
            vec![line("apple", 2), line("pear", 1), line("apple", 3)],
        )
        .wait()
        .unwrap();

    let total: u32 = client
        .read_range_until("orders-1", 0, 2, &ReadParams::new())
        .unwrap()
        .map(|e| e.unwrap().json::<OrderLine>().unwrap().quantity)
        .sum();
    assert_eq!(total, 6);
    assert_eq!(store.subscribe_calls(), 0);
}

#[test]
fn test_range_waits_for_concurrent_writer() {
    let store = MemoryStore::new();
    let client = connect(&store);
    client
        .write_events(
            "orders-1",
            ExpectedVersion::NoStream,
            false,
            vec![line("a", 1), line("b", 1), line("c", 1)],
        )
        .wait()
        .unwrap();

    let sequence = client.read_range_until("orders-1", 0, 4, &ReadParams::new()).unwrap();
    // History is short of the range, so the live subscription is already open.
    assert_eq!(store.subscription_count(), 1);

    let writer = client.clone();
    let handle = thread::spawn(move || {
        for (i, sku) in ["d", "e", "f"].iter().enumerate() {
            writer
                .write_events(
                    "orders-1",
                    ExpectedVersion::Exact(2 + i as u64),
                    false,
                    vec![line(sku, 1)],
                )
                .wait()
                .unwrap();
        }
    });

    let numbers: Vec<u64> = sequence.map(|e| e.unwrap().event_number).collect();
    handle.join().unwrap();

    assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
    assert_eq!(store.subscription_count(), 0);
    assert_eq!(store.unsubscribe_calls(), 1);
    assert_eq!(store.last_event_number("orders-1"), Some(5));
}

#[test]
fn test_optimistic_concurrency() {
    let store = MemoryStore::new();
    let client = connect(&store);

    let first = client
        .write_events("cart-7", ExpectedVersion::NoStream, false, vec![line("a", 1)])
        .wait()
        .unwrap();
    assert_eq!(first.first_event_number, Some(0));

    // A second writer that also believed the stream was new loses.
    let stale = client
        .write_events("cart-7", ExpectedVersion::NoStream, false, vec![line("b", 1)])
        .wait();
    match stale {
        Err(ClientError::WriteConflict(response)) => {
            assert_eq!(response.result, OperationResult::WrongExpectedVersion);
            assert!(!response.message.is_empty());
        }
        other => panic!("Expected WriteConflict, got {:?}", other),
    }

    let next = client
        .write_events("cart-7", ExpectedVersion::Exact(0), false, vec![line("b", 1)])
        .wait()
        .unwrap();
    assert_eq!(next.last_event_number, Some(1));
}

#[test]
fn test_backward_read_finds_latest() {
    let store = MemoryStore::new();
    let client = connect(&store);
    for i in 0..5 {
        client
            .write_events(
                "ticks",
                ExpectedVersion::Any,
                false,
                vec![EventData::json("Tick", &json!({ "i": i })).unwrap()],
            )
            .wait()
            .unwrap();
    }

    let latest: Vec<u64> = client
        .read_stream_events_backward("ticks", STREAM_END, &ReadParams::new().max_count(2))
        .unwrap()
        .map(|e| e.unwrap().event_number)
        .collect();
    assert_eq!(latest, vec![4, 3]);
}

#[test]
fn test_all_stream_interleaves_writes() {
    let store = MemoryStore::new();
    let client = connect(&store);
    for stream in ["a", "b", "a"] {
        client
            .write_events(stream, ExpectedVersion::Any, false, vec![EventData::binary("x", vec![])])
            .wait()
            .unwrap();
    }

    let streams: Vec<String> = client
        .read_all_events_forward(Position::START, &ReadParams::new())
        .unwrap()
        .map(|e| e.unwrap().stream_id)
        .collect();
    assert_eq!(streams, vec!["a", "b", "a"]);

    let newest = client
        .read_all_events_backward(Position::END, &ReadParams::new().max_count(1))
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(newest.stream_id, "a");
    assert_eq!(newest.event_number, 1);
}

// --- Subscriptions ---

#[test]
fn test_subscribe_sees_only_new_events() {
    let store = MemoryStore::new();
    let client = connect(&store);
    client
        .write_events("orders-1", ExpectedVersion::Any, false, vec![line("old", 1)])
        .wait()
        .unwrap();

    let mut subscription = client.subscribe_to_stream("orders-1", &ReadParams::new()).unwrap();
    let confirmation = subscription.wait_confirmed(Duration::from_secs(1)).unwrap();
    assert_eq!(confirmation.last_event_number, Some(0));

    client
        .write_events("orders-1", ExpectedVersion::Any, false, vec![line("new", 1)])
        .wait()
        .unwrap();
    client
        .write_events("orders-2", ExpectedVersion::Any, false, vec![line("other", 1)])
        .wait()
        .unwrap();

    let event = subscription.next().unwrap().unwrap();
    assert_eq!(event.json::<OrderLine>().unwrap().sku, "new");
    assert!(subscription.events().try_next().is_none());

    subscription.close();
    assert_eq!(store.subscription_count(), 0);
    assert!(subscription.next().is_none());
}

#[test]
fn test_link_events_resolved_on_request() {
    let store = MemoryStore::new();
    let client = connect(&store);
    client
        .write_events("orders-1", ExpectedVersion::Any, false, vec![line("apple", 1)])
        .wait()
        .unwrap();
    client
        .write_events(
            "$ce-orders",
            ExpectedVersion::Any,
            false,
            vec![EventData::link_to("orders-1", 0)],
        )
        .wait()
        .unwrap();

    let raw = client
        .read_stream_events_forward("$ce-orders", 0, &ReadParams::new())
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(raw.event_type, "$>");
    assert!(!raw.is_link);

    let resolved = client
        .read_stream_events_forward("$ce-orders", 0, &ReadParams::new().resolve_link_tos(true))
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert!(resolved.is_link);
    assert_eq!(resolved.stream_id, "orders-1");
    assert_eq!(resolved.event_type, "LineAdded");
}

// --- Configuration ---

#[test]
fn test_stream_defaults_apply() {
    let store = MemoryStore::new();
    let config = ClientConfig::default()
        .with_defaults(ReadParams::new().max_count(100))
        .with_stream_defaults("$ce-orders", ReadParams::new().resolve_link_tos(true).max_count(1));
    let client = Client::connect(&store, config).unwrap();

    client
        .write_events("orders-1", ExpectedVersion::Any, false, vec![line("a", 1), line("b", 1)])
        .wait()
        .unwrap();
    client
        .write_events(
            "$ce-orders",
            ExpectedVersion::Any,
            false,
            vec![EventData::link_to("orders-1", 0), EventData::link_to("orders-1", 1)],
        )
        .wait()
        .unwrap();

    let linked: Vec<_> = client
        .read_stream_events_forward("$ce-orders", 0, &ReadParams::new())
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(linked.len(), 1);
    assert!(linked[0].is_link);

    // Call parameters beat stream defaults.
    let all = client
        .read_stream_events_forward("$ce-orders", 0, &ReadParams::new().max_count(10))
        .unwrap()
        .count();
    assert_eq!(all, 2);

    let plain = client
        .read_stream_events_forward("orders-1", 0, &ReadParams::new())
        .unwrap()
        .count();
    assert_eq!(plain, 2);
}

#[test]
fn test_credentials_flow_through() {
    let admin = Credentials::new("admin", "changeit");
    let store = MemoryStore::new().with_credentials(admin.clone());

    let anonymous = Client::connect(&store, ClientConfig::default()).unwrap();
    let denied = anonymous
        .write_events("orders-1", ExpectedVersion::Any, false, vec![line("a", 1)])
        .wait();
    assert!(matches!(
        denied,
        Err(ClientError::WriteConflict(ref r)) if r.result == OperationResult::AccessDenied
    ));
    let mut read = anonymous
        .read_stream_events_forward("orders-1", 0, &ReadParams::new())
        .unwrap();
    assert!(matches!(read.next(), Some(Err(ClientError::StoreOperation { .. }))));

    let authed = Client::connect(&store, ClientConfig::default().with_credentials(admin)).unwrap();
    authed
        .write_events("orders-1", ExpectedVersion::Any, false, vec![line("a", 1)])
        .wait()
        .unwrap();
    let events = authed
        .read_range_until("orders-1", 0, 0, &ReadParams::new())
        .unwrap();
    assert_eq!(events.count(), 1);
}

#[test]
fn test_config_from_json_drives_client() {
    let store = MemoryStore::new();
    let config = ClientConfig::from_json_str(
        r#"{
            "connection": {"connect_timeout_ms": 250},
            "defaults": {"timeout_ms": 40}
        }"#,
    )
    .unwrap();
    let client = Client::connect(&store, config).unwrap();

    let mut events = client.read_range_until("empty", 0, 0, &ReadParams::new()).unwrap();
    assert!(events.next().unwrap().unwrap_err().is_timeout());
    assert_eq!(events.state(), SequenceState::Errored);
    assert_eq!(store.subscription_count(), 0);
}
