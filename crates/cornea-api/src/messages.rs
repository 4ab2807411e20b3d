//! Platform message types.
//!
//! These are the shapes the core consumes and produces. How they travel
//! over the wire is up to the [`Transport`](crate::Transport)
//! implementation; the serde derives only pin down field names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute bag carried by every model, event, and request.
pub type Attributes = Map<String, Value>;

/// Address of the subsystem directory service.
pub const SUBSYSTEM_SERVICE: &str = "SERV:subs:";

/// Well-known command names.
pub mod commands {
    pub const GET_ATTRIBUTES: &str = "base:GetAttributes";
    pub const LIST_SUBSYSTEMS: &str = "subs:ListSubsystems";
}

// ── Push events ──────────────────────────────────────────────────────

/// Kind of a model push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Added,
    Changed,
    Deleted,
}

/// A model push event from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Address of the entity this event is about.
    pub source: String,

    /// Full attributes for `ADDED`, fallback delta for `CHANGED`.
    #[serde(default)]
    pub attributes: Attributes,

    /// Delta of changed attribute names to new values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_attributes: Option<Attributes>,
}

impl PlatformEvent {
    pub fn added(source: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            kind: EventKind::Added,
            source: source.into(),
            attributes,
            changed_attributes: None,
        }
    }

    pub fn changed(source: impl Into<String>, changes: Attributes) -> Self {
        Self {
            kind: EventKind::Changed,
            source: source.into(),
            attributes: Attributes::new(),
            changed_attributes: Some(changes),
        }
    }

    pub fn deleted(source: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Deleted,
            source: source.into(),
            attributes: Attributes::new(),
            changed_attributes: None,
        }
    }
}

// ── Request / response ───────────────────────────────────────────────

/// An outbound request. The matching response carries the same `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequest {
    pub request_id: u64,
    pub address: String,
    pub command: String,
    #[serde(default)]
    pub attributes: Attributes,
    pub timeout_ms: u64,
}

/// A structured platform error. Recognizable codes drive alternate flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ── Session lifecycle ────────────────────────────────────────────────

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionNotice {
    PlaceActivated {
        #[serde(rename = "placeId")]
        place_id: String,
    },
    SessionExpired,
}

// ── Inbound envelope ─────────────────────────────────────────────────

/// Everything a transport can hand to the UI loop.
///
/// Plain data, so it can cross from network threads into the
/// single-threaded core over a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Inbound {
    Event(PlatformEvent),
    #[serde(rename_all = "camelCase")]
    Response {
        request_id: u64,
        result: Result<Attributes, ErrorEvent>,
    },
    Session(SessionNotice),
}
