// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! HTTP handlers for the three ingress routes plus the ambient health
//! check. Decoding is delegated to axum's `Json` extractor, which already
//! yields 400/422 on a malformed body; handlers only need to cover the
//! domain-level failure paths spec.md assigns them.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, info};

use crate::ack_tracker::AckTrackerEffect;
use crate::model::{Ack, Segment, SendMessageRequest};
use crate::segmenter::split_message_to_segments;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
    #[serde(skip)]
    code: StatusCode,
}

impl ApiError {
    fn new(code: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }

    fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code;
        (code, Json(self)).into_response()
    }
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// `POST /sendMessage`: segment the body and enqueue each segment onto the
/// bus, tracking the whole message for retransmission.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendMessageRequest>,
) -> Result<StatusCode, ApiError> {
    if req.message.is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }
    if req.message_id.is_empty() {
        return Err(ApiError::bad_request("messageId must not be empty"));
    }

    let segments = split_message_to_segments(&req, state.config.segment_size);
    state.ack_tracker.register_message(segments.clone()).await;

    for segment in &segments {
        if let Err(err) = state.producer.publish(segment).await {
            error!(error = %err, message_id = %req.message_id, "failed to enqueue segment");
            return Err(ApiError::internal("failed to enqueue message"));
        }
    }

    info!(message_id = %req.message_id, segments = segments.len(), "message enqueued");
    Ok(StatusCode::OK)
}

/// `POST /transferSegment`: a segment has arrived from the channel; buffer
/// it in the reassembler. Always 200 — the heavy lifting happens on the
/// scheduler's next tick, matching the original's fire-and-forget shape.
pub async fn transfer_segment(
    State(state): State<Arc<AppState>>,
    Json(segment): Json<Segment>,
) -> impl IntoResponse {
    state.reassembler.add_segment(segment).await;
    StatusCode::OK
}

/// `POST /transferAck`: a cumulative ACK has arrived from the channel for a
/// message this side sent. Dispatch whatever effect `HandleAck` produces —
/// resend segments are re-enqueued onto the bus, never posted to the
/// channel directly, matching spec.md's ingress responsibility split.
pub async fn transfer_ack(
    State(state): State<Arc<AppState>>,
    Json(ack): Json<Ack>,
) -> impl IntoResponse {
    match state.ack_tracker.handle_ack(&ack).await {
        Ok(Some(AckTrackerEffect::Resend { segments })) => {
            for segment in &segments {
                if let Err(err) = state.producer.publish(segment).await {
                    error!(error = %err, message_id = %ack.message_id, "failed to re-enqueue segment for resend");
                }
            }
        }
        Ok(Some(AckTrackerEffect::Success { final_ack })) => {
            state.outbound.send_final_ack(&final_ack).await;
        }
        Ok(Some(AckTrackerEffect::Failed { final_ack })) => {
            state.outbound.send_final_ack(&final_ack).await;
        }
        Ok(None) => {}
        Err(_unknown) => {
            info!(message_id = %ack.message_id, "ack for unknown or already-resolved message");
        }
    }
    StatusCode::OK
}
