//! Response parsing.
//!
//! Backends disagree on where the reply lives, so the reply text is looked up
//! through an ordered list of named extractors; the first non-empty result
//! wins. The list is data, so supporting another backend shape means adding
//! one entry.

use crate::detection::objects::{DetectedObject, coco_label};
use crate::dispatch::backend::{BackendReply, ImageReply};
use crate::error::DialogueFailure;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

/// A named way of pulling reply text out of a response body.
pub struct ReplyExtractor {
    pub name: &'static str,
    pub extract: fn(&Value) -> Option<&str>,
}

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Reply extractors in priority order.
pub const REPLY_EXTRACTORS: &[ReplyExtractor] = &[
    ReplyExtractor {
        name: "response",
        extract: |v| field(v, "response"),
    },
    ReplyExtractor {
        name: "reply",
        extract: |v| field(v, "reply"),
    },
    ReplyExtractor {
        name: "text",
        extract: |v| field(v, "text"),
    },
    ReplyExtractor {
        name: "message",
        extract: |v| field(v, "message"),
    },
    ReplyExtractor {
        name: "message.content",
        extract: |v| v.get("message").and_then(|m| field(m, "content")),
    },
    ReplyExtractor {
        name: "answer",
        extract: |v| field(v, "answer"),
    },
    ReplyExtractor {
        name: "choices[0].message.content",
        extract: |v| {
            v.get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| field(m, "content"))
        },
    },
    ReplyExtractor {
        name: "content",
        extract: |v| field(v, "content"),
    },
    ReplyExtractor {
        name: "bare string",
        extract: Value::as_str,
    },
];

/// Fields that may carry base64 audio for the reply.
const AUDIO_FIELDS: &[&str] = &["audio", "audio_base64", "audioBase64"];

/// Parse a conversational response body.
///
/// Empty, whitespace-only and `null` bodies are `EmptyOrNullResponse`;
/// bodies that are not JSON are `DecodeFailure`; JSON without any non-empty
/// reply field is `EmptyOrNullResponse`.
pub fn parse_reply(body: &str) -> Result<BackendReply, DialogueFailure> {
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Err(DialogueFailure::EmptyOrNullResponse);
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| DialogueFailure::DecodeFailure(format!("unparsable body: {}", e)))?;
    if value.is_null() {
        return Err(DialogueFailure::EmptyOrNullResponse);
    }

    let (name, text) = REPLY_EXTRACTORS
        .iter()
        .find_map(|extractor| {
            (extractor.extract)(&value)
                .map(str::trim)
                .filter(|text| !text.is_empty() && *text != "null")
                .map(|text| (extractor.name, text))
        })
        .ok_or(DialogueFailure::EmptyOrNullResponse)?;
    tracing::trace!(extractor = name, "reply extracted");

    Ok(BackendReply {
        text: text.to_string(),
        audio: extract_audio(&value),
    })
}

fn extract_audio(value: &Value) -> Option<Vec<u8>> {
    let encoded = AUDIO_FIELDS
        .iter()
        .find_map(|key| field(value, key))
        .filter(|s| !s.is_empty())?;
    // Strip a data-URL prefix ("data:audio/mpeg;base64,...")
    let encoded = encoded.split_once(',').map_or(encoded, |(_, data)| data);
    match STANDARD.decode(encoded) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable reply audio");
            None
        }
    }
}

/// Parse an image endpoint response.
///
/// Accepts `detections: [{class_id, box_x, box_y, confidence}]` and
/// `objects: [{label, x, y}]`. A `status` starting with `error` fails.
pub fn parse_image_reply(body: &str) -> Result<ImageReply, DialogueFailure> {
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Err(DialogueFailure::EmptyOrNullResponse);
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| DialogueFailure::DecodeFailure(format!("unparsable body: {}", e)))?;

    if let Some(status) = field(&value, "status")
        && status.starts_with("error")
    {
        return Err(DialogueFailure::DecodeFailure(status.to_string()));
    }

    let mut objects = Vec::new();
    if let Some(detections) = value.get("detections").and_then(Value::as_array) {
        for det in detections {
            let label = det
                .get("class_id")
                .and_then(Value::as_u64)
                .and_then(|id| coco_label(id as u32))
                .map(str::to_string)
                .or_else(|| field(det, "label").map(str::to_string));
            let (Some(label), Some(x), Some(y)) = (
                label,
                det.get("box_x").and_then(Value::as_f64),
                det.get("box_y").and_then(Value::as_f64),
            ) else {
                continue;
            };
            objects.push(DetectedObject {
                label,
                x: x as f32,
                y: y as f32,
                confidence: det.get("confidence").and_then(Value::as_f64).map(|c| c as f32),
            });
        }
    }
    if let Some(items) = value.get("objects").and_then(Value::as_array) {
        for item in items {
            let (Some(label), Some(x), Some(y)) = (
                field(item, "label"),
                item.get("x").and_then(Value::as_f64),
                item.get("y").and_then(Value::as_f64),
            ) else {
                continue;
            };
            objects.push(DetectedObject {
                label: label.to_string(),
                x: x as f32,
                y: y as f32,
                confidence: item.get("confidence").and_then(Value::as_f64).map(|c| c as f32),
            });
        }
    }

    let advisory = ["text", "message"]
        .iter()
        .find_map(|key| field(&value, key))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(ImageReply {
        frame_id: value
            .get("frame_id")
            .or_else(|| value.get("frameId"))
            .and_then(Value::as_u64),
        objects,
        advisory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_alias_wins() {
        let reply = parse_reply(r#"{"reply": "second", "response": "first"}"#).unwrap();
        assert_eq!(reply.text, "first");
    }

    #[test]
    fn test_empty_alias_falls_through_to_next() {
        let reply = parse_reply(r#"{"response": "  ", "text": "from text"}"#).unwrap();
        assert_eq!(reply.text, "from text");
    }

    #[test]
    fn test_openai_shape() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "Name three things you hear."}}]}"#;
        assert_eq!(parse_reply(body).unwrap().text, "Name three things you hear.");
    }

    #[test]
    fn test_nested_message_content() {
        let body = r#"{"message": {"content": "You are safe."}}"#;
        assert_eq!(parse_reply(body).unwrap().text, "You are safe.");
    }

    #[test]
    fn test_bare_json_string() {
        assert_eq!(parse_reply(r#""Breathe in.""#).unwrap().text, "Breathe in.");
    }

    #[test]
    fn test_empty_and_null_bodies() {
        assert_eq!(parse_reply(""), Err(DialogueFailure::EmptyOrNullResponse));
        assert_eq!(parse_reply("null"), Err(DialogueFailure::EmptyOrNullResponse));
        assert_eq!(parse_reply("  \n"), Err(DialogueFailure::EmptyOrNullResponse));
        assert_eq!(
            parse_reply(r#"{"response": "null"}"#),
            Err(DialogueFailure::EmptyOrNullResponse)
        );
    }

    #[test]
    fn test_no_known_field_is_empty_response() {
        assert_eq!(
            parse_reply(r#"{"status": "ok"}"#),
            Err(DialogueFailure::EmptyOrNullResponse)
        );
    }

    #[test]
    fn test_unparsable_body_is_decode_failure() {
        assert!(matches!(
            parse_reply("<html>502 Bad Gateway</html>"),
            Err(DialogueFailure::DecodeFailure(_))
        ));
    }

    #[test]
    fn test_audio_payload_is_decoded() {
        let body = r#"{"response": "hi", "audio": "data:audio/mpeg;base64,aGVsbG8="}"#;
        let reply = parse_reply(body).unwrap();
        assert_eq!(reply.audio.as_deref(), Some(b"hello".as_slice()));
    }

    #[test]
    fn test_bad_audio_keeps_text() {
        let reply = parse_reply(r#"{"response": "hi", "audio": "%%%"}"#).unwrap();
        assert_eq!(reply.text, "hi");
        assert_eq!(reply.audio, None);
    }

    #[test]
    fn test_image_reply_coco_detections() {
        let body = r#"{
            "detections": [
                {"class_id": 56, "box_x": 0.3, "box_y": 0.6, "confidence": 0.95},
                {"class_id": 62, "box_x": 0.2, "box_y": 0.2, "confidence": 0.92},
                {"class_id": 999, "box_x": 0.1, "box_y": 0.1}
            ],
            "processing_time": 0.02,
            "frame_id": 12,
            "status": "success"
        }"#;
        let reply = parse_image_reply(body).unwrap();
        let labels: Vec<&str> = reply.objects.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["chair", "tv"]);
        assert_eq!(reply.frame_id, Some(12));
        assert!((reply.objects[0].x - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_image_reply_labeled_objects_and_advisory() {
        let body = r#"{"objects": [{"label": "lamp", "x": 0.4, "y": 0.1}], "text": "A lamp is nearby."}"#;
        let reply = parse_image_reply(body).unwrap();
        assert_eq!(reply.objects[0].label, "lamp");
        assert_eq!(reply.objects[0].confidence, None);
        assert_eq!(reply.advisory.as_deref(), Some("A lamp is nearby."));
    }

    #[test]
    fn test_image_reply_error_status() {
        let body = r#"{"detections": null, "frame_id": 3, "status": "error: bad image"}"#;
        assert_eq!(
            parse_image_reply(body),
            Err(DialogueFailure::DecodeFailure("error: bad image".to_string()))
        );
    }
}
