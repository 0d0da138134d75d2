//! Typed command / status-event envelopes.
//!
//! Every record on a command or status topic has the same outer shape:
//!
//! ```json
//! { "transactionId": "<uuid>", "type": "<ENUM>", "body": { ... },
//!   "worldId": 0, "channelId": 1, "mapId": 100000000, "characterId": 42 }
//! ```
//!
//! Consumers decode into [`RawEnvelope`] first, gate on `type`, then
//! deserialize the body into the variant they care about.

use common::TransactionId;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::codec::CodecError;

/// Routing fields copied onto an envelope when the message concerns a
/// specific world, channel, map instance, character or account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_id: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<u32>,
}

impl Routing {
    /// Routing bound to a single character.
    pub fn character(character_id: u32) -> Self {
        Self {
            character_id: Some(character_id),
            ..Default::default()
        }
    }

    /// Routing bound to a map (map-wide messages).
    pub fn map(world_id: u8, channel_id: u8, map_id: u32) -> Self {
        Self {
            world_id: Some(world_id),
            channel_id: Some(channel_id),
            map_id: Some(map_id),
            ..Default::default()
        }
    }

    /// Picks routing fields out of a camelCase JSON body.
    ///
    /// Fields that are absent or out of range for their type are left unset.
    pub fn from_body(body: &serde_json::Value) -> Self {
        fn number<T: TryFrom<u64>>(body: &serde_json::Value, field: &str) -> Option<T> {
            body.get(field)
                .and_then(serde_json::Value::as_u64)
                .and_then(|n| T::try_from(n).ok())
        }

        Self {
            world_id: number(body, "worldId"),
            channel_id: number(body, "channelId"),
            map_id: number(body, "mapId"),
            instance: body
                .get("instance")
                .and_then(serde_json::Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok()),
            character_id: number(body, "characterId"),
            account_id: number(body, "accountId"),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A wire envelope parameterized by its body type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<B> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,

    /// Discriminator; handlers dispatch on it.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub routing: Routing,

    pub body: B,
}

/// An envelope whose body has not been interpreted yet.
pub type RawEnvelope = Envelope<serde_json::Value>;

impl<B> Envelope<B> {
    pub fn new(kind: impl Into<String>, body: B) -> Self {
        Self {
            transaction_id: None,
            kind: kind.into(),
            routing: Routing::default(),
            body,
        }
    }

    pub fn with_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    /// Returns true if the envelope carries the given type tag.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Returns the transaction id, failing for envelopes that must carry one.
    pub fn require_transaction_id(&self) -> Result<TransactionId, CodecError> {
        self.transaction_id.ok_or_else(|| {
            CodecError::MalformedEnvelope(format!("{} envelope missing transactionId", self.kind))
        })
    }
}

impl<B: Serialize> Envelope<B> {
    /// Erases the body type.
    pub fn into_raw(self) -> Result<RawEnvelope, CodecError> {
        Ok(Envelope {
            transaction_id: self.transaction_id,
            kind: self.kind,
            routing: self.routing,
            body: serde_json::to_value(self.body)?,
        })
    }
}

impl RawEnvelope {
    /// Deserializes the body into a concrete variant.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            CodecError::MalformedEnvelope(format!("{} body did not match: {e}", self.kind))
        })
    }

    /// Reads a string field from an object body.
    pub fn body_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(serde_json::Value::as_str)
    }
}
