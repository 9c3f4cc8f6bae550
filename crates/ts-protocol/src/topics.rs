//! Device shadow topic builders and parsers.
//!
//! Topic structure:
//! ```text
//! $aws/things/{thing_name}/shadow/get
//! $aws/things/{thing_name}/shadow/get/accepted
//! $aws/things/{thing_name}/shadow/get/rejected
//! $aws/things/{thing_name}/shadow/update
//! $aws/things/{thing_name}/shadow/update/accepted
//! $aws/things/{thing_name}/shadow/update/rejected
//! $aws/things/{thing_name}/shadow/update/delta
//! $aws/things/{thing_name}/shadow/update/documents
//! ```
//!
//! Topics are only ever built from [`Operation`] and [`Subtype`]; callers
//! never hand in raw topic strings.

use std::fmt;

const PREFIX: &str = "$aws/things";
const SHADOW: &str = "shadow";

/// Shadow operation segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Update,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Update => "update",
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "get" => Some(Self::Get),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

/// Optional trailing segment of a shadow topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subtype {
    Accepted,
    Rejected,
    Delta,
    Documents,
    /// Single-level MQTT wildcard (`+`), only meaningful in subscriptions.
    Wildcard,
}

impl Subtype {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Delta => "delta",
            Self::Documents => "documents",
            Self::Wildcard => "+",
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "delta" => Some(Self::Delta),
            "documents" => Some(Self::Documents),
            "+" => Some(Self::Wildcard),
            _ => None,
        }
    }
}

// ─── Builders ───

/// Build `$aws/things/{thing_name}/shadow/{operation}[/{subtype}]`.
pub fn shadow_topic(thing_name: &str, operation: Operation, subtype: Option<Subtype>) -> String {
    let op = operation.as_str();
    match subtype {
        Some(sub) => format!("{PREFIX}/{thing_name}/{SHADOW}/{op}/{}", sub.as_str()),
        None => format!("{PREFIX}/{thing_name}/{SHADOW}/{op}"),
    }
}

/// Request topic for `get` (no subtype).
pub fn get(thing_name: &str) -> String {
    shadow_topic(thing_name, Operation::Get, None)
}

/// Request topic for `update` (no subtype).
pub fn update(thing_name: &str) -> String {
    shadow_topic(thing_name, Operation::Update, None)
}

// ─── Subscription patterns (with MQTT wildcards) ───

/// Every `get` response for a thing: `.../shadow/get/+`.
pub fn get_responses(thing_name: &str) -> String {
    shadow_topic(thing_name, Operation::Get, Some(Subtype::Wildcard))
}

/// Every `update` response for a thing: `.../shadow/update/+`.
pub fn update_responses(thing_name: &str) -> String {
    shadow_topic(thing_name, Operation::Update, Some(Subtype::Wildcard))
}

// ─── Topic parsing ───

/// Parsed shadow topic components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShadowTopic {
    pub thing_name: String,
    pub operation: Operation,
    pub subtype: Option<Subtype>,
}

impl fmt::Display for ShadowTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shadow_topic(&self.thing_name, self.operation, self.subtype))
    }
}

/// Parse a topic string into its shadow components.
/// Returns `None` if the topic is outside the shadow grammar.
pub fn parse_topic(topic: &str) -> Option<ShadowTopic> {
    let rest = topic.strip_prefix(PREFIX)?.strip_prefix('/')?;
    let parts: Vec<&str> = rest.split('/').collect();

    if parts.len() < 3 || parts.len() > 4 || parts[1] != SHADOW || parts[0].is_empty() {
        return None;
    }

    let operation = Operation::parse(parts[2])?;
    let subtype = match parts.get(3) {
        Some(segment) => Some(Subtype::parse(segment)?),
        None => None,
    };

    Some(ShadowTopic {
        thing_name: parts[0].to_string(),
        operation,
        subtype,
    })
}
