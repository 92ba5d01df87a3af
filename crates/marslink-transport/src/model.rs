// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Wire data model shared by the HTTP ingress, the event bus, and the two
//! core state machines. Field names mirror the JSON contract in the system
//! spec exactly; the Rust fields are snake_case and carry `#[serde(rename)]`
//! where the wire name differs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /sendMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub sender: String,
    pub message: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
}

/// One fixed-size fragment of a message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub sender: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "segmentIndex")]
    pub segment_index: usize,
    #[serde(rename = "totalSegments")]
    pub total_segments: usize,
    pub payload: String,
}

/// The reassembled message, delivered upstream to the receiving application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "hasError")]
    pub has_error: bool,
}

/// A cumulative acknowledgement. `last_confirmed_segment == -1` means
/// nothing has been received yet. `final` (the reserved keyword, hence
/// `r#final`) means the receiver has ceased accepting segments for this
/// `messageId`, whether by success or abandonment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "lastConfirmedSegment")]
    pub last_confirmed_segment: i64,
    pub r#final: bool,
}

/// Status reported in a `FinalAck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalAckStatus {
    Success,
    Error,
}

/// Terminal status report posted back to the sender application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAck {
    #[serde(rename = "messageID")]
    pub message_id: String,
    pub status: FinalAckStatus,
}
