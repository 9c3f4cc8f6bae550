use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::topics::{Operation, ShadowTopic, Subtype};

/// JSON field carrying the correlation token on every request and response.
pub const CLIENT_TOKEN_FIELD: &str = "clientToken";

/// Correlation identifier echoed back by the broker on get/update responses.
///
/// Uniqueness is up to the caller; outstanding tokens are not tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientToken(String);

impl ClientToken {
    /// Fresh random token in the 8-4-4-4-12 hex layout.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for ClientToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClientToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for ClientToken {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Outbound get/update payload: caller state plus exactly one `clientToken`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowEnvelope {
    #[serde(rename = "clientToken")]
    pub client_token: ClientToken,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl ShadowEnvelope {
    /// Envelope for a `get` request: only the token.
    pub fn get(client_token: ClientToken) -> Self {
        Self {
            client_token,
            body: Map::new(),
        }
    }

    /// Envelope for an `update` request. Any `clientToken` already present
    /// in `state` is replaced by `client_token`.
    pub fn update(mut state: Map<String, Value>, client_token: ClientToken) -> Self {
        state.remove(CLIENT_TOKEN_FIELD);
        Self {
            client_token,
            body: state,
        }
    }
}

/// Extract the echoed `clientToken` from an inbound payload, if any.
pub fn client_token_of(payload: &Value) -> Option<&str> {
    payload.get(CLIENT_TOKEN_FIELD).and_then(Value::as_str)
}

/// The six inbound shadow outcomes, in classification precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowResponse {
    GetAccepted,
    GetRejected,
    UpdateAccepted,
    UpdateRejected,
    UpdateDocuments,
    UpdateDelta,
}

impl ShadowResponse {
    /// Precedence order used by [`ShadowResponse::classify`]; first match wins.
    pub const ALL: [Self; 6] = [
        Self::GetAccepted,
        Self::GetRejected,
        Self::UpdateAccepted,
        Self::UpdateRejected,
        Self::UpdateDocuments,
        Self::UpdateDelta,
    ];

    pub fn operation(self) -> Operation {
        match self {
            Self::GetAccepted | Self::GetRejected => Operation::Get,
            _ => Operation::Update,
        }
    }

    pub fn subtype(self) -> Subtype {
        match self {
            Self::GetAccepted | Self::UpdateAccepted => Subtype::Accepted,
            Self::GetRejected | Self::UpdateRejected => Subtype::Rejected,
            Self::UpdateDocuments => Subtype::Documents,
            Self::UpdateDelta => Subtype::Delta,
        }
    }

    /// Event-style name, e.g. `get.message.accepted`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetAccepted => "get.message.accepted",
            Self::GetRejected => "get.message.rejected",
            Self::UpdateAccepted => "update.message.accepted",
            Self::UpdateRejected => "update.message.rejected",
            Self::UpdateDocuments => "update.message.documents",
            Self::UpdateDelta => "update.message.delta",
        }
    }

    /// Map a parsed topic onto one of the six outcomes.
    ///
    /// Request topics (no subtype), wildcards and combinations outside the
    /// set (e.g. `get/delta`) yield `None`.
    pub fn classify(topic: &ShadowTopic) -> Option<Self> {
        let subtype = topic.subtype?;
        Self::ALL
            .into_iter()
            .find(|r| r.operation() == topic.operation && r.subtype() == subtype)
    }
}

impl fmt::Display for ShadowResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Typed views over inbound payloads ───

/// Desired/reported/delta sections of a shadow document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowState {
    /// State desired by the cloud.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<Value>,
    /// State reported by the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported: Option<Value>,
    /// Difference between desired and reported (present on `get/accepted`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Value>,
}

/// Body of `get/accepted` and `update/accepted` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowDocument {
    #[serde(default)]
    pub state: ShadowState,
    #[serde(default)]
    pub metadata: Value,
    /// Shadow version (monotonically increasing).
    #[serde(default)]
    pub version: Option<u64>,
    /// Broker timestamp, seconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(rename = "clientToken", default)]
    pub client_token: Option<ClientToken>,
}

impl ShadowDocument {
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Body of `get/rejected` and `update/rejected` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowRejection {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(rename = "clientToken", default)]
    pub client_token: Option<ClientToken>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::parse_topic;
    use serde_json::json;

    fn classify_str(topic: &str) -> Option<ShadowResponse> {
        parse_topic(topic).as_ref().and_then(ShadowResponse::classify)
    }

    #[test]
    fn generated_token_is_uuid_shaped() {
        let token = ClientToken::generate();
        let parsed = Uuid::parse_str(token.as_str()).unwrap();
        assert_eq!(parsed.to_string(), token.as_str());
        let groups: Vec<usize> = token.as_str().split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert_ne!(ClientToken::generate(), token);
    }

    #[test]
    fn get_envelope_carries_only_token() {
        let envelope = ShadowEnvelope::get("T".into());
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, json!({"clientToken": "T"}));
    }

    #[test]
    fn update_envelope_stamps_token() {
        let state = json!({"state": {"reported": {"brightness": 5}}});
        let Value::Object(map) = state else {
            unreachable!()
        };
        let envelope = ShadowEnvelope::update(map, "T".into());
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["clientToken"], "T");
        assert_eq!(value["state"]["reported"]["brightness"], 5);
    }

    #[test]
    fn update_envelope_replaces_existing_token() {
        let Value::Object(map) = json!({"clientToken": "old", "brightness": 5}) else {
            unreachable!()
        };
        let envelope = ShadowEnvelope::update(map, "new".into());
        let text = serde_json::to_string(&envelope).unwrap();
        assert_eq!(text.matches("clientToken").count(), 1);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(client_token_of(&value), Some("new"));
    }

    #[test]
    fn classify_all_six_outcomes() {
        let base = "$aws/things/lamp-01/shadow";
        assert_eq!(
            classify_str(&format!("{base}/get/accepted")),
            Some(ShadowResponse::GetAccepted)
        );
        assert_eq!(
            classify_str(&format!("{base}/get/rejected")),
            Some(ShadowResponse::GetRejected)
        );
        assert_eq!(
            classify_str(&format!("{base}/update/accepted")),
            Some(ShadowResponse::UpdateAccepted)
        );
        assert_eq!(
            classify_str(&format!("{base}/update/rejected")),
            Some(ShadowResponse::UpdateRejected)
        );
        assert_eq!(
            classify_str(&format!("{base}/update/documents")),
            Some(ShadowResponse::UpdateDocuments)
        );
        assert_eq!(
            classify_str(&format!("{base}/update/delta")),
            Some(ShadowResponse::UpdateDelta)
        );
    }

    #[test]
    fn classify_rejects_other_combinations() {
        assert_eq!(classify_str("$aws/things/lamp-01/shadow/get/delta"), None);
        assert_eq!(classify_str("$aws/things/lamp-01/shadow/get/documents"), None);
        assert_eq!(classify_str("$aws/things/lamp-01/shadow/update"), None);
        assert_eq!(classify_str("$aws/things/lamp-01/shadow/get/+"), None);
        assert_eq!(classify_str("$aws/things/lamp-01/shadow/delete"), None);
    }

    #[test]
    fn response_names() {
        let names: Vec<&str> = ShadowResponse::ALL.iter().map(|r| r.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "get.message.accepted",
                "get.message.rejected",
                "update.message.accepted",
                "update.message.rejected",
                "update.message.documents",
                "update.message.delta",
            ]
        );
    }

    #[test]
    fn parse_accepted_document() {
        let payload = json!({
            "state": {
                "desired": {"brightness": 7},
                "reported": {"brightness": 5},
                "delta": {"brightness": 7}
            },
            "metadata": {},
            "version": 12,
            "timestamp": 1469564492,
            "clientToken": "T"
        });
        let doc: ShadowDocument = serde_json::from_value(payload).unwrap();
        assert_eq!(doc.version, Some(12));
        assert_eq!(doc.timestamp_utc().unwrap().timestamp(), 1469564492);
        assert_eq!(doc.state.reported.as_ref().unwrap()["brightness"], 5);
        assert_eq!(doc.client_token.as_ref().map(ClientToken::as_str), Some("T"));
    }

    #[test]
    fn parse_rejection() {
        let payload = json!({
            "code": 404,
            "message": "No shadow exists with name: 'lamp-01'",
            "clientToken": "T"
        });
        let rejection: ShadowRejection = serde_json::from_value(payload).unwrap();
        assert_eq!(rejection.code, 404);
        assert!(rejection.timestamp.is_none());
        assert_eq!(rejection.client_token.unwrap().as_str(), "T");
    }
}
