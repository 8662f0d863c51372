use std::sync::Arc;

use serde_json::json;

use super::hook::{hook, try_hook};
use super::message::{Envelope, RequestMessage};
use super::responder::Responder;
use super::test_support::RecordingDealer;
use crate::codec::JsonCodec;

fn responder() -> (Arc<RecordingDealer>, Responder) {
    let dealer = Arc::new(RecordingDealer::new("node-b"));
    let responder = Responder::new(dealer.clone(), Arc::new(JsonCodec));
    (dealer, responder)
}

fn request(name: &str, sequence: u64, data: serde_json::Value) -> RequestMessage {
    RequestMessage {
        name: name.to_string(),
        from: "node-a".to_string(),
        sequence,
        data,
    }
}

#[test]
fn hook_result_becomes_response_data() {
    let (dealer, responder) = responder();
    responder.add_on_request_handler("foo", hook(|d: i64| d + 10));

    responder.handle_request(request("foo", 7, json!(12))).unwrap();

    assert_eq!(dealer.sent.lock()[0][0], b"node-a".to_vec());
    match dealer.envelope(0) {
        Envelope::Response(response) => {
            assert_eq!(response.sequence, 7);
            assert_eq!(response.data, json!(22));
            assert!(response.error.is_none());
        }
        other => panic!("Expected a response, got {other:?}"),
    }
}

#[test]
fn unknown_request_still_gets_empty_answer() {
    let (dealer, responder) = responder();

    responder.handle_request(request("nobody", 3, json!(1))).unwrap();

    match dealer.envelope(0) {
        Envelope::Response(response) => {
            assert_eq!(response.sequence, 3);
            assert_eq!(response.data, json!({}));
        }
        other => panic!("Expected a response, got {other:?}"),
    }
}

#[test]
fn failing_hook_answers_with_error() {
    let (_dealer, responder) = responder();
    responder.add_on_request_handler(
        "div",
        try_hook(|(a, b): (i64, i64)| {
            if b == 0 {
                Err("division by zero")
            } else {
                Ok(a / b)
            }
        }),
    );

    let response = responder.respond(&request("div", 0, json!([1, 0])));
    assert_eq!(response.error.as_deref(), Some("division by zero"));
    assert!(response.data.is_null());

    let response = responder.respond(&request("div", 1, json!([9, 3])));
    assert_eq!(response.data, json!(3));
}

#[test]
fn panicking_hook_is_contained() {
    let (dealer, responder) = responder();
    responder.add_on_request_handler("explode", hook(|_: serde_json::Value| -> i64 { panic!("kaboom") }));

    responder.handle_request(request("explode", 0, json!(null))).unwrap();

    match dealer.envelope(0) {
        Envelope::Response(response) => {
            assert!(response.error.unwrap().contains("kaboom"));
        }
        other => panic!("Expected a response, got {other:?}"),
    }
}

#[test]
fn mistyped_payload_answers_with_error() {
    let (_dealer, responder) = responder();
    responder.add_on_request_handler("num", hook(|d: i64| d));

    let response = responder.respond(&request("num", 0, json!("twelve")));
    assert!(response.error.is_some());
}

#[test]
fn handlers_overwrite_and_remove() {
    let (_dealer, responder) = responder();
    responder.add_on_request_handler("v", hook(|_: serde_json::Value| 1));
    responder.add_on_request_handler("v", hook(|_: serde_json::Value| 2));

    assert_eq!(responder.respond(&request("v", 0, json!(null))).data, json!(2));
    assert!(responder.remove_on_request_handler("v"));
    assert!(!responder.remove_on_request_handler("v"));
    assert!(!responder.has_handler("v"));
}
