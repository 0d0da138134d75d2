//! Partition key derivation.
//!
//! Keys are the ASCII decimal rendering of the actor id so every message for
//! one character lands on one partition. Map-wide messages key on the map id;
//! messages bound to neither fall back to the transaction id. Pure functions;
//! no external state is consulted.

use common::TransactionId;

use crate::envelope::Envelope;

pub fn key_for_character(character_id: u32) -> Vec<u8> {
    character_id.to_string().into_bytes()
}

pub fn key_for_map(map_id: u32) -> Vec<u8> {
    map_id.to_string().into_bytes()
}

pub fn key_for_transaction(transaction_id: TransactionId) -> Vec<u8> {
    transaction_id.to_string().into_bytes()
}

/// Derives the partition key for an envelope: character, then map, then transaction.
///
/// Returns `None` when the envelope carries none of them; such records are
/// spread across partitions by the broker.
pub fn partition_key<B>(envelope: &Envelope<B>) -> Option<Vec<u8>> {
    if let Some(character_id) = envelope.routing.character_id {
        return Some(key_for_character(character_id));
    }
    if let Some(map_id) = envelope.routing.map_id {
        return Some(key_for_map(map_id));
    }
    envelope.transaction_id.map(key_for_transaction)
}
