//! WebSocket message types for live feed notifications.
//!
//! Every frame is an envelope `{type, payload}`:
//! - Server → Client: `post` notifications, `pong` heartbeat replies
//! - Client → Server: any envelope; only `ping` is acted on

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::feed::FeedEvent;

// ============================================
// Server → Client Messages
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A post landed in the recipient's feed.
    Post(PostPayload),

    /// Heartbeat response.
    Pong,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostPayload {
    #[serde(rename = "postId")]
    pub post_id: String,
    #[serde(rename = "postText")]
    pub post_text: String,
    pub author_user_id: String,
}

impl From<&FeedEvent> for PostPayload {
    fn from(event: &FeedEvent) -> Self {
        Self {
            post_id: event.post_id.to_string(),
            post_text: event.text.clone(),
            author_user_id: event.author_id.to_string(),
        }
    }
}

impl ServerMessage {
    /// Serializes once so the same frame can be fanned out to many sockets.
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}

/// Outbound `post` frame for a feed event.
pub fn post_frame(event: &FeedEvent) -> Result<Arc<str>, serde_json::Error> {
    ServerMessage::Post(PostPayload::from(event)).to_frame()
}

// ============================================
// Client → Server Messages
// ============================================

/// Inbound envelope. Unknown types are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ClientEnvelope {
    pub fn is_ping(&self) -> bool {
        self.kind == "ping"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feed::PostCreatedEvent;
    use crate::domain::foundation::{PostId, UserId};

    fn feed_event() -> FeedEvent {
        FeedEvent::from(&PostCreatedEvent::new(
            PostId::new("p-7").unwrap(),
            UserId::new("alice").unwrap(),
            "hello",
        ))
    }

    #[test]
    fn post_frame_has_expected_shape() {
        let frame = post_frame(&feed_event()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(json["type"], "post");
        assert_eq!(json["payload"]["postId"], "p-7");
        assert_eq!(json["payload"]["postText"], "hello");
        assert_eq!(json["payload"]["author_user_id"], "alice");
    }

    #[test]
    fn pong_serializes_without_payload() {
        let frame = ServerMessage::Pong.to_frame().unwrap();
        assert_eq!(&*frame, r#"{"type":"pong"}"#);
    }

    #[test]
    fn client_envelope_parses_ping() {
        let env: ClientEnvelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(env.is_ping());
        assert!(env.payload.is_null());
    }

    #[test]
    fn client_envelope_keeps_unknown_payloads() {
        let env: ClientEnvelope =
            serde_json::from_str(r#"{"type":"typing","payload":{"to":"bob"}}"#).unwrap();
        assert!(!env.is_ping());
        assert_eq!(env.payload["to"], "bob");
    }

    #[test]
    fn client_envelope_requires_type() {
        assert!(serde_json::from_str::<ClientEnvelope>(r#"{"payload":1}"#).is_err());
    }
}
