//! JSON frames exchanged with the sidecar.
//!
//! Commands flow gateway → sidecar, events flow back. Every frame is
//! tenant-scoped; `send` commands carry a request id that the sidecar
//! echoes in its `sendResult`.

use serde::{Deserialize, Serialize};

use courier_events::{GroupUpdate, IncomingMessage, MessageAck, PresenceUpdate};

/// Gateway → sidecar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum CommandFrame {
    /// Open (or re-open) a tenant's provider connection. Absent
    /// credentials start a pairing flow.
    #[serde(rename_all = "camelCase")]
    Connect {
        id: String,
        tenant: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        credentials: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    Send {
        id: String,
        tenant: String,
        recipient: String,
        body: String,
    },
    #[serde(rename_all = "camelCase")]
    Close { id: String, tenant: String },
}

/// Sidecar → gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EventFrame {
    #[serde(rename_all = "camelCase")]
    Pairing { tenant: String, code: String },
    #[serde(rename_all = "camelCase")]
    Connected {
        tenant: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        device: Option<String>,
    },
    /// The provider rotated the stored auth material.
    #[serde(rename_all = "camelCase")]
    Credentials {
        tenant: String,
        blob: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    Disconnected {
        tenant: String,
        reason: String,
        #[serde(default)]
        terminal: bool,
    },
    #[serde(rename_all = "camelCase")]
    LoggedOut { tenant: String },
    #[serde(rename_all = "camelCase")]
    Message {
        tenant: String,
        #[serde(flatten)]
        message: IncomingMessage,
    },
    #[serde(rename_all = "camelCase")]
    Ack {
        tenant: String,
        #[serde(flatten)]
        ack: MessageAck,
    },
    #[serde(rename_all = "camelCase")]
    GroupUpdate {
        tenant: String,
        #[serde(flatten)]
        update: GroupUpdate,
    },
    #[serde(rename_all = "camelCase")]
    Presence {
        tenant: String,
        #[serde(flatten)]
        presence: PresenceUpdate,
    },
    /// Outcome for a `send` command, matched by request id.
    #[serde(rename_all = "camelCase")]
    SendResult {
        id: String,
        tenant: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl EventFrame {
    pub fn tenant(&self) -> &str {
        match self {
            Self::Pairing { tenant, .. }
            | Self::Connected { tenant, .. }
            | Self::Credentials { tenant, .. }
            | Self::Disconnected { tenant, .. }
            | Self::LoggedOut { tenant }
            | Self::Message { tenant, .. }
            | Self::Ack { tenant, .. }
            | Self::GroupUpdate { tenant, .. }
            | Self::Presence { tenant, .. }
            | Self::SendResult { tenant, .. } => tenant,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn command_frames_carry_op_tags() {
        let frame = CommandFrame::Send {
            id: "r1".into(),
            tenant: "t1".into(),
            recipient: "peer".into(),
            body: "hello".into(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["op"], "send");
        assert_eq!(value["id"], "r1");
        assert_eq!(value["tenant"], "t1");

        let back: CommandFrame = serde_json::from_value(value).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn connect_omits_absent_credentials() {
        let frame = CommandFrame::Connect {
            id: "r2".into(),
            tenant: "t1".into(),
            credentials: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("credentials"));
    }

    #[test]
    fn message_frame_flattens_payload() {
        let raw = json!({
            "event": "message",
            "tenant": "t1",
            "messageId": "m1",
            "chat": "c1",
            "sender": "peer",
            "body": "hi",
            "fromMe": false,
            "timestampMs": 1_700_000_000_000u64,
        });
        let frame: EventFrame = serde_json::from_value(raw).unwrap();
        let EventFrame::Message { tenant, message } = &frame else {
            panic!("wrong variant: {frame:?}");
        };
        assert_eq!(tenant, "t1");
        assert_eq!(message.message_id, "m1");
        assert_eq!(message.body, "hi");
    }

    #[test]
    fn disconnected_terminal_defaults_to_false() {
        let raw = json!({"event": "disconnected", "tenant": "t1", "reason": "stream error"});
        let frame: EventFrame = serde_json::from_value(raw).unwrap();
        assert_eq!(frame, EventFrame::Disconnected {
            tenant: "t1".into(),
            reason: "stream error".into(),
            terminal: false,
        });
    }

    #[test]
    fn send_result_round_trips() {
        let frame = EventFrame::SendResult {
            id: "r9".into(),
            tenant: "t1".into(),
            message_id: Some("m9".into()),
            error: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"event\":\"sendResult\""));
        assert!(!json.contains("error"));
        let back: EventFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
        assert_eq!(back.tenant(), "t1");
    }
}
