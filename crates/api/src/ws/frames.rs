//! Wire frames for run sessions.
//!
//! Outbound frames are JSON objects tagged with the run id and a timestamp:
//! `{"type": "stdout", "data": "...", "runId": 7, "timestamp": "..."}`.
//! Inbound frames are `{"type": "stdin", "data": "..."}`; anything that
//! fails to parse is treated as raw stdin text so plain-text clients keep
//! working.

use axum::extract::ws::Message;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use synchub_core::types::{DbId, Timestamp};

use crate::runner::events::RunEvent;

/// Outbound frame discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Stdout,
    Stderr,
    Status,
    Error,
    AuthUrl,
}

/// One server-to-client frame.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub data: String,
    #[serde(rename = "runId")]
    pub run_id: DbId,
    pub timestamp: Timestamp,
}

impl OutboundFrame {
    pub fn new(kind: FrameKind, run_id: DbId, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
            run_id,
            timestamp: Utc::now(),
        }
    }

    pub fn status(run_id: DbId, data: impl Into<String>) -> Self {
        Self::new(FrameKind::Status, run_id, data)
    }

    pub fn error(run_id: DbId, data: impl Into<String>) -> Self {
        Self::new(FrameKind::Error, run_id, data)
    }

    /// Frame a process event for the wire.
    pub fn from_event(run_id: DbId, event: &RunEvent) -> Self {
        match event {
            RunEvent::Stdout(data) => Self::new(FrameKind::Stdout, run_id, data.clone()),
            RunEvent::Stderr(data) => Self::new(FrameKind::Stderr, run_id, data.clone()),
            RunEvent::Status(data) => Self::new(FrameKind::Status, run_id, data.clone()),
            RunEvent::Error(data) => Self::new(FrameKind::Error, run_id, data.clone()),
            RunEvent::AuthUrl(data) => Self::new(FrameKind::AuthUrl, run_id, data.clone()),
        }
    }

    /// Serialize into a WebSocket text message.
    pub fn to_message(&self) -> Message {
        let json = serde_json::to_string(self).expect("outbound frame serializes");
        Message::Text(json.into())
    }
}

/// One client-to-server frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Stdin { data: String },
}

/// Extract the stdin payload from an inbound text message.
///
/// A well-formed `stdin` frame yields its `data`; any other or unparseable
/// payload is returned verbatim as raw stdin text.
pub fn stdin_payload(text: &str) -> String {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Stdin { data }) => data,
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_frame_shape() {
        let frame = OutboundFrame::new(FrameKind::Stdout, 7, "synced 10 files");
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();

        assert_eq!(json["type"], "stdout");
        assert_eq!(json["data"], "synced 10 files");
        assert_eq!(json["runId"], 7);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn auth_url_kind_uses_snake_case() {
        let frame = OutboundFrame::from_event(
            3,
            &RunEvent::AuthUrl("https://accounts.example.com/oauth/authorize?x=1".to_string()),
        );
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"auth_url\""));
    }

    #[test]
    fn stdin_frame_parses() {
        assert_eq!(stdin_payload(r#"{"type":"stdin","data":"123456"}"#), "123456");
    }

    #[test]
    fn raw_text_falls_back_to_stdin() {
        assert_eq!(stdin_payload("123456"), "123456");
        assert_eq!(stdin_payload(r#"{"type":"unknown"}"#), r#"{"type":"unknown"}"#);
    }
}
