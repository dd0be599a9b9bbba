// Wire types shared by the HTTP surface and the live channel

use serde::{Deserialize, Serialize};

/// A stored chat message.
///
/// `id` and `timestamp` are assigned by the store at append time; the
/// client never supplies them. `body` serializes as `message` to match
/// the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub timestamp: String,
    pub nickname: String,
    #[serde(rename = "message")]
    pub body: String,
}

/// An event pushed to live listeners.
///
/// Two shapes only: a full message record for a submission, or a delete
/// marker carrying the removed id. Consumers switch on the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Message(Message),
    Delete { id: i64 },
}

impl Event {
    /// Serialize to a JSON string for a WebSocket text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The message id this event refers to.
    pub fn id(&self) -> i64 {
        match self {
            Event::Message(m) => m.id,
            Event::Delete { id } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_event_json_shape() {
        let event = Event::Message(Message {
            id: 7,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            nickname: "a".to_string(),
            body: "hi".to_string(),
        });

        let json: serde_json::Value =
            serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["id"], 7);
        assert_eq!(json["nickname"], "a");
        assert_eq!(json["message"], "hi");
    }

    #[test]
    fn test_delete_event_json_shape() {
        let event = Event::Delete { id: 3 };

        let json: serde_json::Value =
            serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["id"], 3);
    }

    #[test]
    fn test_event_roundtrip() {
        let event = Event::Delete { id: 42 };
        let parsed: Event =
            serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.id(), 42);
    }
}
