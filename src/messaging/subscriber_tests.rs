use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use serde_json::json;

use super::hook::{handler, try_handler};
use super::subscriber::{OwnerId, Registration, Subscriber};
use super::test_support::{RecordingReceiver, encode_json};
use crate::codec::JsonCodec;
use crate::transport::message::published;
use crate::utils::error::MessagingError;

fn subscriber() -> (Arc<RecordingReceiver>, Arc<Subscriber>) {
    let socket = Arc::new(RecordingReceiver::default());
    let subscriber = Arc::new(Subscriber::new(socket.clone(), Arc::new(JsonCodec)));
    (socket, subscriber)
}

fn adder(total: &Arc<AtomicI64>, sign: i64) -> super::hook::Handler {
    let total = total.clone();
    handler(move |data: i64| {
        total.fetch_add(sign * data, Ordering::SeqCst);
    })
}

#[test]
fn first_handler_creates_topic_and_filter() {
    let (socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));

    let first = subscriber.add_handler("foo", "a", adder(&total, 1)).unwrap();
    let second = subscriber.add_handler("foo", "b", adder(&total, 1)).unwrap();

    assert_eq!(first, Registration::Created);
    assert_eq!(second, Registration::Added);
    assert!(socket.is_filtering("foo"));
    assert_eq!(subscriber.handler_count("foo"), 2);
}

#[test]
fn new_topic_registration_refuses_existing_topic() {
    let (_socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));

    assert!(subscriber.add_handler_to_new_topic("foo", "a", adder(&total, 1)).unwrap());
    assert!(!subscriber.add_handler_to_new_topic("foo", "b", adder(&total, 1)).unwrap());

    assert_eq!(subscriber.handler_count("foo"), 1);
    assert!(subscriber.owner_topics(&OwnerId::from("b")).is_empty());

    let err = subscriber
        .add_handler_to_new_topic("foo", "a", adder(&total, 1))
        .unwrap_err();
    assert!(matches!(err, MessagingError::DuplicateHandler { .. }));
    assert_eq!(subscriber.handler_count("foo"), 1);
}

#[test]
fn same_owner_twice_on_topic_is_rejected() {
    let (_socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));
    subscriber.add_handler("foo", "a", adder(&total, 1)).unwrap();

    let err = subscriber
        .add_handler("foo", "a", adder(&total, 1))
        .unwrap_err();

    assert!(matches!(err, MessagingError::DuplicateHandler { .. }));
    assert_eq!(subscriber.handler_count("foo"), 1);
    // The same owner may still hold handlers on other topics.
    assert!(subscriber.add_handler("bar", "a", adder(&total, 1)).is_ok());
}

#[test]
fn dispatch_follows_registration_order() {
    let (_socket, subscriber) = subscriber();
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["h1", "h2", "h3"] {
        let order = order.clone();
        subscriber
            .add_handler(
                "t",
                name,
                handler(move |_: serde_json::Value| order.lock().push(name)),
            )
            .unwrap();
    }

    assert_eq!(subscriber.dispatch("t", &json!(1)), 3);
    assert_eq!(*order.lock(), vec!["h1", "h2", "h3"]);
}

#[test]
fn failing_handler_does_not_stop_the_rest() {
    let (_socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));

    subscriber
        .add_handler("t", "err", try_handler(|_: i64| Err("nope")))
        .unwrap();
    subscriber
        .add_handler(
            "t",
            "panic",
            handler(|_: i64| panic!("handler blew up")),
        )
        .unwrap();
    subscriber.add_handler("t", "ok", adder(&total, 1)).unwrap();

    subscriber.dispatch("t", &json!(4));
    assert_eq!(total.load(Ordering::SeqCst), 4);
}

#[test]
fn publication_frames_are_decoded_and_dispatched() {
    let (_socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));
    subscriber.add_handler("foo", "a", adder(&total, 1)).unwrap();

    subscriber.handle_publication(&published("foo", encode_json(&json!(10))));
    subscriber.handle_publication(&published("other", encode_json(&json!(99))));
    subscriber.handle_publication(&published("foo", b"{garbage".to_vec()));
    subscriber.handle_publication(&vec![b"foo".to_vec()]);

    assert_eq!(total.load(Ordering::SeqCst), 10);
}

#[test]
fn remove_all_with_name_clears_topic_and_index() {
    let (socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));
    subscriber.add_handler("foo", "a", adder(&total, 1)).unwrap();
    subscriber.add_handler("foo", "b", adder(&total, 1)).unwrap();
    subscriber.add_handler("bar", "b", adder(&total, 1)).unwrap();

    assert_eq!(subscriber.remove_all_handlers_with_name("foo"), 2);

    assert!(!socket.is_filtering("foo"));
    assert!(subscriber.owner_topics(&OwnerId::from("a")).is_empty());
    let b_topics = subscriber.owner_topics(&OwnerId::from("b"));
    assert_eq!(b_topics.len(), 1);
    assert!(b_topics.contains("bar"));
    assert_eq!(subscriber.dispatch("foo", &json!(1)), 0);
    assert_eq!(subscriber.remove_all_handlers_with_name("foo"), 0);
}

#[test]
fn remove_by_id_reports_handlers_left() {
    let (socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));
    subscriber.add_handler("foo5", "foo5-1", adder(&total, 1)).unwrap();
    subscriber.add_handler("foo5", "foo5-2", adder(&total, -1)).unwrap();

    for _ in 0..10 {
        subscriber.dispatch("foo5", &json!(1));
    }
    assert_eq!(total.load(Ordering::SeqCst), 0);

    let left = subscriber.remove_handler_by_id(&OwnerId::from("foo5-2"), "foo5");
    assert_eq!(left, Some(1));
    for _ in 0..10 {
        subscriber.dispatch("foo5", &json!(1));
    }
    assert_eq!(total.load(Ordering::SeqCst), 10);

    assert_eq!(
        subscriber.remove_handler_by_id(&OwnerId::from("foo5-1"), "foo5"),
        Some(0)
    );
    assert!(!socket.is_filtering("foo5"));
    assert!(subscriber.topics().is_empty());
}

#[test]
fn remove_by_id_on_unknown_pairing_is_none() {
    let (_socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));
    subscriber.add_handler("foo", "a", adder(&total, 1)).unwrap();

    assert_eq!(subscriber.remove_handler_by_id(&OwnerId::from("b"), "foo"), None);
    assert_eq!(subscriber.remove_handler_by_id(&OwnerId::from("a"), "bar"), None);
    assert_eq!(subscriber.handler_count("foo"), 1);
}

#[test]
fn remove_all_with_id_uses_owner_snapshot() {
    let (socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));
    let id = OwnerId::from("id-1");

    subscriber.add_handler("foo6", id.clone(), adder(&total, 1)).unwrap();
    subscriber.add_handler("foo7", id.clone(), adder(&total, -1)).unwrap();
    subscriber.add_handler("foo7", "different_id", adder(&total, 1)).unwrap();

    for _ in 0..10 {
        subscriber.dispatch("foo6", &json!(1));
        subscriber.dispatch("foo7", &json!(1));
    }
    assert_eq!(total.load(Ordering::SeqCst), 10);

    assert_eq!(subscriber.remove_all_handlers_with_id(&id), 2);
    assert!(subscriber.owner_topics(&id).is_empty());
    assert!(!socket.is_filtering("foo6"));
    assert!(socket.is_filtering("foo7"));

    for _ in 0..10 {
        subscriber.dispatch("foo7", &json!(1));
    }
    assert_eq!(total.load(Ordering::SeqCst), 20);
    assert_eq!(subscriber.remove_all_handlers_with_id(&id), 0);
}

#[test]
fn handler_may_remove_its_own_topic() {
    let (_socket, subscriber) = subscriber();
    let received = Arc::new(AtomicI64::new(0));

    let engine = Arc::downgrade(&subscriber);
    let sum = received.clone();
    subscriber
        .add_handler(
            "foo3",
            "foo3",
            handler(move |data: i64| {
                if sum.fetch_add(data, Ordering::SeqCst) + data == 5 {
                    if let Some(engine) = engine.upgrade() {
                        engine.remove_all_handlers_with_name("foo3");
                    }
                }
            }),
        )
        .unwrap();

    for _ in 0..10 {
        subscriber.dispatch("foo3", &json!(1));
    }
    assert_eq!(received.load(Ordering::SeqCst), 5);
}

#[test]
fn generated_owner_ids_are_per_engine() {
    let (_s1, first) = subscriber();
    let (_s2, second) = subscriber();

    assert_eq!(first.generate_owner_id(), OwnerId::Generated(0));
    assert_eq!(first.generate_owner_id(), OwnerId::Generated(1));
    assert_eq!(second.generate_owner_id(), OwnerId::Generated(0));
}

#[test]
fn numeric_names_do_not_collide_with_generated_ids() {
    let (_socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));
    let generated = subscriber.generate_owner_id();

    subscriber.add_handler("topic", generated.clone(), adder(&total, 1)).unwrap();
    assert_eq!(
        subscriber.add_handler("topic", "0", adder(&total, 10)).unwrap(),
        Registration::Added
    );

    assert_eq!(subscriber.remove_handler_by_id(&OwnerId::from("0"), "topic"), Some(1));
    assert_eq!(subscriber.remove_handler_by_id(&OwnerId::from("0"), "topic"), None);

    subscriber.dispatch("topic", &json!(1));
    assert_eq!(total.load(Ordering::SeqCst), 1);
    assert!(subscriber.owner_topics(&generated).contains("topic"));
}

#[test]
fn close_clears_registry_and_socket() {
    let (socket, subscriber) = subscriber();
    let total = Arc::new(AtomicI64::new(0));
    subscriber.add_handler("a", "x", adder(&total, 1)).unwrap();
    subscriber.add_handler("b", "y", adder(&total, 1)).unwrap();

    subscriber.close();

    assert!(subscriber.topics().is_empty());
    assert!(socket.filters.lock().is_empty());
    assert!(socket.is_closed());
}
