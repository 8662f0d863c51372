use super::{Codec, CodecError, JsonCodec, raw_frame};
use serde_json::json;

#[test]
fn json_codec_encodes_structured_text() {
    let bytes = JsonCodec.encode(&json!({"sequence": 3, "data": [1, 2]})).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("\"sequence\":3"));
}

#[test]
fn json_codec_decodes_scalars() {
    assert_eq!(JsonCodec.decode(b"22").unwrap(), json!(22));
    assert_eq!(JsonCodec.decode(b"\"hi\"").unwrap(), json!("hi"));
}

#[test]
fn json_codec_rejects_garbage() {
    let err = JsonCodec.decode(b"{not json").unwrap_err();
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn raw_frame_leaves_strings_unquoted() {
    assert_eq!(raw_frame(&json!("hello")), b"hello".to_vec());
    assert_eq!(raw_frame(&json!(10)), b"10".to_vec());
    assert_eq!(raw_frame(&json!({"a": 1})), br#"{"a":1}"#.to_vec());
}
