//! Inbound message classification for shadow responses.
//!
//! Parses the topic of a raw inbound publish into its shadow components,
//! maps it onto one of the six [`ShadowResponse`] outcomes and decodes the
//! JSON payload, so the shadow client can dispatch without topic string
//! matching.

use serde_json::Value;

use ts_protocol::ShadowResponse;
use ts_protocol::topics;

use crate::channel::InboundMessage;

/// A classified inbound message.
#[derive(Debug)]
pub enum IncomingMessage {
    /// Recognized shadow response with a JSON payload.
    Shadow {
        response: ShadowResponse,
        thing_name: String,
        payload: Value,
    },
    /// Recognized topic, but the payload is not valid JSON.
    Malformed {
        response: ShadowResponse,
        topic: String,
        error: String,
    },
    /// Topic outside the six shadow responses.
    Unknown { topic: String },
}

/// Classify a raw inbound publish.
pub fn classify(message: &InboundMessage) -> IncomingMessage {
    let topic = &message.topic;

    let Some(parsed) = topics::parse_topic(topic) else {
        return IncomingMessage::Unknown {
            topic: topic.clone(),
        };
    };
    let Some(response) = ShadowResponse::classify(&parsed) else {
        return IncomingMessage::Unknown {
            topic: topic.clone(),
        };
    };

    match serde_json::from_slice::<Value>(&message.payload) {
        Ok(payload) => IncomingMessage::Shadow {
            response,
            thing_name: parsed.thing_name,
            payload,
        },
        Err(e) => IncomingMessage::Malformed {
            response,
            topic: topic.clone(),
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(topic: &str, payload: &Value) -> InboundMessage {
        InboundMessage::new(topic, serde_json::to_vec(payload).unwrap())
    }

    #[test]
    fn classify_get_accepted() {
        let body = json!({"state": {"reported": {"brightness": 5}}, "clientToken": "T"});
        let msg = classify(&message("$aws/things/lamp-01/shadow/get/accepted", &body));
        assert!(matches!(
            msg,
            IncomingMessage::Shadow { response: ShadowResponse::GetAccepted, ref thing_name, ref payload }
                if thing_name == "lamp-01" && *payload == body
        ));
    }

    #[test]
    fn classify_update_delta() {
        let body = json!({"version": 3, "state": {"brightness": 9}});
        let msg = classify(&message("$aws/things/lamp-01/shadow/update/delta", &body));
        assert!(matches!(
            msg,
            IncomingMessage::Shadow {
                response: ShadowResponse::UpdateDelta,
                ..
            }
        ));
    }

    #[test]
    fn classify_unknown_topic() {
        let msg = classify(&InboundMessage::new(
            "$aws/things/lamp-01/shadow/delete",
            b"{}".to_vec(),
        ));
        assert!(matches!(msg, IncomingMessage::Unknown { .. }));

        let msg = classify(&InboundMessage::new("some/random/topic", b"data".to_vec()));
        assert!(matches!(msg, IncomingMessage::Unknown { .. }));
    }

    #[test]
    fn classify_bad_payload() {
        let msg = classify(&InboundMessage::new(
            "$aws/things/lamp-01/shadow/update/rejected",
            b"not-json".to_vec(),
        ));
        assert!(matches!(
            msg,
            IncomingMessage::Malformed {
                response: ShadowResponse::UpdateRejected,
                ..
            }
        ));
    }

    #[test]
    fn classify_request_echo_is_unknown() {
        // Our own publishes on the request topic are not responses.
        let msg = classify(&InboundMessage::new(
            "$aws/things/lamp-01/shadow/update",
            b"{}".to_vec(),
        ));
        assert!(matches!(msg, IncomingMessage::Unknown { .. }));
    }
}
