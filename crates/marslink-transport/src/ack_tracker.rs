// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Send-side core: tracks in-flight messages, applies the retransmission
//! policy to incoming ACKs, and re-sends on silence. The companion state
//! machine to [`crate::reassembler::Reassembler`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::model::{Ack, FinalAck, FinalAckStatus, Segment};

/// Consecutive stalled ACKs (no forward progress) tolerated before a
/// message is given up on. One stall is allowed — the second is fatal.
const STALL_LIMIT: u32 = 1;

/// Default inactivity window before a tracked message with no inbound ACK
/// at all is abandoned. Unlike `TIMEOUT_DURATION`/`CHECK_INTERVAL`, spec.md
/// does not expose this as an environment variable, so it is a fixed
/// constant rather than something `Config` loads.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

struct TrackedMessage {
    segments: Vec<Segment>,
    total_segments: usize,
    last_confirmed: i64,
    stall_count: u32,
    sent_at: Instant,
}

/// What the caller must dispatch once the tracker's lock is released.
#[derive(Debug)]
pub enum AckTrackerEffect {
    /// Re-send these segments (either from a stalled ACK or a bare timeout).
    Resend { segments: Vec<Segment> },
    /// The receiver confirmed every segment: report success upstream.
    Success { final_ack: FinalAck },
    /// The stall budget ran out, or the receiver signaled early
    /// termination: report failure upstream.
    Failed { final_ack: FinalAck },
}

/// Outcome of [`AckTracker::handle_ack`] for a `messageId` this tracker has
/// never seen (already completed, or never sent) — a no-op, not an error,
/// since ACKs can race message completion.
pub struct UnknownMessage;

pub struct AckTracker<C: Clock = crate::clock::SystemClock> {
    tracked: Mutex<HashMap<String, TrackedMessage>>,
    ack_timeout: Duration,
    clock: C,
}

impl<C: Clock> AckTracker<C> {
    pub fn new(ack_timeout: Duration, clock: C) -> Self {
        Self {
            tracked: Mutex::new(HashMap::new()),
            ack_timeout,
            clock,
        }
    }

    /// Begin tracking a freshly segmented, freshly sent message.
    pub async fn register_message(&self, segments: Vec<Segment>) {
        let Some(first) = segments.first() else {
            return;
        };
        let message_id = first.message_id.clone();
        let total_segments = first.total_segments;

        let mut tracked = self.tracked.lock().await;
        tracked.insert(
            message_id,
            TrackedMessage {
                segments,
                total_segments,
                last_confirmed: -1,
                stall_count: 0,
                sent_at: self.clock.now(),
            },
        );
    }

    /// Apply an incoming [`Ack`] to the tracked message it names.
    pub async fn handle_ack(&self, ack: &Ack) -> Result<Option<AckTrackerEffect>, UnknownMessage> {
        let mut tracked = self.tracked.lock().await;
        let Some(entry) = tracked.get_mut(&ack.message_id) else {
            return Err(UnknownMessage);
        };

        // The receiver ceasing to accept segments (success or abandonment
        // on its side) is terminal here regardless of the segment count it
        // reports, matching the receiver's own one-shot finality guarantee.
        if ack.r#final && ack.last_confirmed_segment < entry.total_segments as i64 - 1 {
            info!(message_id = %ack.message_id, "receiver_terminated before full delivery");
            tracked.remove(&ack.message_id);
            return Ok(Some(AckTrackerEffect::Failed {
                final_ack: FinalAck {
                    message_id: ack.message_id.clone(),
                    status: FinalAckStatus::Error,
                },
            }));
        }

        if ack.last_confirmed_segment == entry.total_segments as i64 - 1 {
            tracked.remove(&ack.message_id);
            info!(message_id = %ack.message_id, "delivery confirmed");
            return Ok(Some(AckTrackerEffect::Success {
                final_ack: FinalAck {
                    message_id: ack.message_id.clone(),
                    status: FinalAckStatus::Success,
                },
            }));
        }

        let resend_from = (ack.last_confirmed_segment + 1) as usize;
        let resend = entry.segments[resend_from.min(entry.segments.len())..].to_vec();

        if ack.last_confirmed_segment <= entry.last_confirmed {
            entry.stall_count += 1;
            if entry.stall_count > STALL_LIMIT {
                tracked.remove(&ack.message_id);
                info!(message_id = %ack.message_id, "stall limit reached, abandoning send");
                return Ok(Some(AckTrackerEffect::Failed {
                    final_ack: FinalAck {
                        message_id: ack.message_id.clone(),
                        status: FinalAckStatus::Error,
                    },
                }));
            }
            debug!(message_id = %ack.message_id, stall_count = entry.stall_count, "ack stalled, resending");
        } else {
            entry.stall_count = 0;
        }

        // A reordered/duplicate ack can report a lower index than one
        // already recorded; never let `last_confirmed` move backwards.
        entry.last_confirmed = entry.last_confirmed.max(ack.last_confirmed_segment);
        entry.sent_at = self.clock.now();

        Ok(Some(AckTrackerEffect::Resend { segments: resend }))
    }

    /// Periodic tick implementing `handleTimeout`: any message that has
    /// gone silent (no inbound ACK, no `Track`) for longer than
    /// `ack_timeout` is abandoned and reported as a failure upstream. This
    /// is a pure backstop for total silence — it never resends, since a
    /// receiver that is still talking drives retransmission through
    /// `handle_ack`'s stall/progress branches instead.
    pub async fn check_timeouts(&self) -> Vec<AckTrackerEffect> {
        let now = self.clock.now();
        let mut tracked = self.tracked.lock().await;
        let mut to_remove = Vec::new();
        let mut effects = Vec::new();

        for (message_id, entry) in tracked.iter() {
            if now.duration_since(entry.sent_at) <= self.ack_timeout {
                continue;
            }
            info!(message_id = %message_id, "inactivity timeout, abandoning send");
            to_remove.push(message_id.clone());
            effects.push(AckTrackerEffect::Failed {
                final_ack: FinalAck {
                    message_id: message_id.clone(),
                    status: FinalAckStatus::Error,
                },
            });
        }

        for id in &to_remove {
            tracked.remove(id);
        }

        effects
    }

    #[cfg(test)]
    async fn tracked_len(&self) -> usize {
        self.tracked.lock().await.len()
    }
}
