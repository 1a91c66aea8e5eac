/*!
Message payload and the canonical record envelope that keeps the tombstone
flag alive across record re-derivations
*/

use serde::{Deserialize, Serialize};

/// Author id the client uses for system messages; their deletions are never
/// worth logging.
pub const SYSTEM_AUTHOR_ID: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
}

/// Delivery state of a message as the client reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    Pending,
    #[default]
    Sent,
    SendFailed,
}

/// Wire-shaped message payload. `tombstoned` is not part of the upstream
/// schema; it is an out-of-band annotation that defaults to false so
/// payloads from the client deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub author: Author,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub state: DeliveryState,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub tombstoned: bool,
}

/// In-memory record form of a message. Every creation and update path
/// funnels through one constructor, so no re-derivation of a record can
/// silently drop the tombstone flag.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub message: Message,
    pub tombstoned: bool,
    pub reactions: Vec<Reaction>,
}

impl MessageRecord {
    /// The single construction path. Keeps the payload's own flag in sync
    /// with the envelope so a record serialized back out still carries it.
    fn build(mut message: Message, tombstoned: bool, reactions: Vec<Reaction>) -> Self {
        message.tombstoned = tombstoned;
        Self {
            message,
            tombstoned,
            reactions,
        }
    }

    /// Create a record from a raw payload; flag and reactions come from the
    /// payload itself.
    pub fn from_payload(message: Message) -> Self {
        let tombstoned = message.tombstoned;
        let reactions = message.reactions.clone();
        Self::build(message, tombstoned, reactions)
    }

    /// Apply an update payload onto this record. The tombstone wins over a
    /// plain update: once set, an incoming non-tombstoned payload does not
    /// clear it, and the prior record's reactions are reused instead of the
    /// default merge (which takes whatever the incoming payload carries).
    pub fn apply_update(&self, incoming: Message) -> Self {
        let tombstoned = self.tombstoned || incoming.tombstoned;
        let reactions = if tombstoned {
            self.reactions.clone()
        } else {
            incoming.reactions.clone()
        };
        Self::build(incoming, tombstoned, reactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(id: &str, tombstoned: bool) -> Message {
        Message {
            id: id.to_string(),
            channel_id: "c1".to_string(),
            author: Author {
                id: "42".to_string(),
                username: "ada".to_string(),
            },
            content: "hello".to_string(),
            state: DeliveryState::Sent,
            timestamp: 1_700_000_000_000,
            reactions: Vec::new(),
            tombstoned,
        }
    }

    #[test]
    fn creation_copies_flag_from_payload() {
        let record = MessageRecord::from_payload(payload("m1", true));
        assert!(record.tombstoned);
        assert!(record.message.tombstoned);

        let record = MessageRecord::from_payload(payload("m1", false));
        assert!(!record.tombstoned);
    }

    #[test]
    fn tombstone_survives_plain_update() {
        let mut first = payload("m1", true);
        first.reactions = vec![Reaction {
            emoji: "+1".to_string(),
            count: 3,
        }];
        let record = MessageRecord::from_payload(first);

        let mut edit = payload("m1", false);
        edit.content = "edited".to_string();
        let updated = record.apply_update(edit);

        assert!(updated.tombstoned);
        assert!(updated.message.tombstoned);
        assert_eq!(updated.message.content, "edited");
        // Reactions carried over from the prior record, not the update.
        assert_eq!(updated.reactions, record.reactions);
    }

    #[test]
    fn update_into_tombstoned_state_keeps_prior_reactions() {
        let mut first = payload("m1", false);
        first.reactions = vec![Reaction {
            emoji: "wave".to_string(),
            count: 1,
        }];
        let record = MessageRecord::from_payload(first);

        let tombstoning = payload("m1", true);
        let updated = record.apply_update(tombstoning);

        assert!(updated.tombstoned);
        assert_eq!(updated.reactions, record.reactions);
    }

    #[test]
    fn plain_update_merges_incoming_reactions() {
        let record = MessageRecord::from_payload(payload("m1", false));

        let mut edit = payload("m1", false);
        edit.reactions = vec![Reaction {
            emoji: "eyes".to_string(),
            count: 2,
        }];
        let updated = record.apply_update(edit.clone());

        assert!(!updated.tombstoned);
        assert_eq!(updated.reactions, edit.reactions);
    }

    #[test]
    fn foreign_payload_without_flag_deserializes() {
        let raw = r#"{
            "id": "m1",
            "channel_id": "c1",
            "author": { "id": "42", "username": "ada" },
            "content": "hi"
        }"#;
        let message: Message = serde_json::from_str(raw).unwrap();
        assert!(!message.tombstoned);
        assert_eq!(message.state, DeliveryState::Sent);
    }
}
