// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Periodic ticker driving both state machines' timeout arithmetic.
//! Grounded on the discovery server's lease-checker task: a `select!`
//! between a fixed-interval sleep and a shutdown notification.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::ack_tracker::AckTrackerEffect;
use crate::reassembler::ReassemblerEffect;
use crate::AppState;

/// Spawn the reassembler's timeout/assembly ticker. Runs until `shutdown`
/// is notified.
pub fn spawn_reassembler_ticker(
    state: Arc<AppState>,
    interval: Duration,
    shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let effects = state.reassembler.check_timeouts_and_assemble().await;
                    for effect in effects {
                        dispatch_reassembler_effect(&state, effect).await;
                    }
                }
                _ = shutdown.notified() => {
                    debug!("reassembler ticker shutting down");
                    break;
                }
            }
        }
    })
}

/// Spawn the ack tracker's silence ticker: abandons any message that has
/// received no ACK at all for `ACK_TIMEOUT`, without waiting for the
/// sender application to notice.
pub fn spawn_ack_tracker_ticker(
    state: Arc<AppState>,
    interval: Duration,
    shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let effects = state.ack_tracker.check_timeouts().await;
                    for effect in effects {
                        dispatch_ack_tracker_effect(&state, effect).await;
                    }
                }
                _ = shutdown.notified() => {
                    debug!("ack tracker ticker shutting down");
                    break;
                }
            }
        }
    })
}

async fn dispatch_reassembler_effect(state: &Arc<AppState>, effect: ReassemblerEffect) {
    match effect {
        ReassemblerEffect::Complete { message, ack } => {
            state.outbound.deliver_message(&message).await;
            if let Err(err) = state.outbound.forward_ack_to_channel(&ack).await {
                warn!(error = %err, "final ack delivery to channel failed");
            }
        }
        ReassemblerEffect::IntermediateAck { ack } => {
            if let Err(err) = state.outbound.forward_ack_to_channel(&ack).await {
                warn!(error = %err, "intermediate ack delivery to channel failed");
            }
        }
        ReassemblerEffect::Abandoned { ack } => {
            if let Err(err) = state.outbound.forward_ack_to_channel(&ack).await {
                warn!(error = %err, "abandonment ack delivery to channel failed");
            }
        }
    }
}

async fn dispatch_ack_tracker_effect(state: &Arc<AppState>, effect: AckTrackerEffect) {
    match effect {
        AckTrackerEffect::Resend { segments } => {
            for segment in &segments {
                if let Err(err) = state.producer.publish(segment).await {
                    warn!(error = %err, "failed to re-enqueue segment for resend");
                }
            }
        }
        AckTrackerEffect::Success { final_ack } => {
            state.outbound.send_final_ack(&final_ack).await;
        }
        AckTrackerEffect::Failed { final_ack } => {
            state.outbound.send_final_ack(&final_ack).await;
        }
    }
}
