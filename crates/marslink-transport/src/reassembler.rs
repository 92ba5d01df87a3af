// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Receive-side core: buffers segments per `messageId`, detects completion,
//! and emits cumulative ACKs under a stall policy. This is one of the two
//! state machines this service exists to implement (see
//! [`crate::ack_tracker`] for the send side).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::model::{Ack, Message, Segment};

/// Consecutive no-progress timeout checks allowed before a buffered
/// message is abandoned without assembly.
const STALL_LIMIT: u32 = 2;

struct BufferedMessage {
    sender: String,
    segments: HashMap<usize, String>,
    received_at: Instant,
    total_segments: usize,
    last_confirmed: i64,
    failed_attempts: u32,
}

impl BufferedMessage {
    fn new(sender: String, total_segments: usize, now: Instant) -> Self {
        Self {
            sender,
            segments: HashMap::new(),
            received_at: now,
            total_segments,
            last_confirmed: -1,
            failed_attempts: 0,
        }
    }

    /// Largest `k` such that every index in `[0, k]` is present; `-1` if
    /// index 0 itself is missing. This is the cumulative-ACK prefix rule —
    /// a later out-of-order arrival never raises it until the gap fills.
    fn contiguous_prefix(&self) -> i64 {
        let mut k: i64 = -1;
        while self.segments.contains_key(&((k + 1) as usize)) {
            k += 1;
        }
        k
    }

    fn is_complete(&self, current_confirmed: i64) -> bool {
        current_confirmed == self.total_segments as i64 - 1
    }

    fn assemble(&self) -> String {
        (0..self.total_segments)
            .map(|i| self.segments.get(&i).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

/// What the caller must dispatch as a result of a tick, after the buffer
/// lock has been released (outbound HTTP must never be issued while the
/// lock is held).
#[derive(Debug)]
pub enum ReassemblerEffect {
    /// Message fully assembled: deliver it upstream, then emit a final ACK.
    Complete { message: Message, ack: Ack },
    /// Stalled but still within the retry budget: emit a non-final ACK.
    IntermediateAck { ack: Ack },
    /// Stall budget exhausted: emit a final ACK without ever assembling.
    Abandoned { ack: Ack },
}

pub struct Reassembler<C: Clock = crate::clock::SystemClock> {
    buffer: Mutex<HashMap<String, BufferedMessage>>,
    timeout: Duration,
    clock: C,
}

impl<C: Clock> Reassembler<C> {
    pub fn new(timeout: Duration, clock: C) -> Self {
        Self {
            buffer: Mutex::new(HashMap::new()),
            timeout,
            clock,
        }
    }

    /// Buffer one arriving segment. Silently drops (with a log line)
    /// segments with an empty `messageId`, or whose `totalSegments`
    /// disagrees with the first segment seen for this message.
    pub async fn add_segment(&self, seg: Segment) {
        if seg.message_id.is_empty() {
            warn!("dropping segment with empty messageId");
            return;
        }

        let now = self.clock.now();
        let mut buffer = self.buffer.lock().await;
        let entry = buffer
            .entry(seg.message_id.clone())
            .or_insert_with(|| BufferedMessage::new(seg.sender.clone(), seg.total_segments, now));

        if entry.total_segments != seg.total_segments {
            warn!(
                message_id = %seg.message_id,
                expected = entry.total_segments,
                got = seg.total_segments,
                "totalSegments mismatch, dropping segment"
            );
            return;
        }

        if seg.segment_index >= entry.total_segments {
            warn!(
                message_id = %seg.message_id,
                segment_index = seg.segment_index,
                total_segments = entry.total_segments,
                "segmentIndex out of range, dropping segment"
            );
            return;
        }

        entry.segments.insert(seg.segment_index, seg.payload);
        entry.received_at = now;
    }

    /// Periodic tick: walk every buffered message, assemble completed ones,
    /// and apply the stall policy to the rest. Completion always wins over
    /// timeout within a single tick.
    pub async fn check_timeouts_and_assemble(&self) -> Vec<ReassemblerEffect> {
        let now = self.clock.now();
        let mut buffer = self.buffer.lock().await;
        let mut effects = Vec::new();
        let mut to_remove = Vec::new();

        for (message_id, buf) in buffer.iter_mut() {
            let current_confirmed = buf.contiguous_prefix();

            if buf.is_complete(current_confirmed) {
                let message = Message {
                    sender: buf.sender.clone(),
                    content: buf.assemble(),
                    timestamp: chrono::Utc::now(),
                    has_error: false,
                };
                let ack = Ack {
                    message_id: message_id.clone(),
                    last_confirmed_segment: current_confirmed,
                    r#final: true,
                };
                info!(message_id = %message_id, "message assembled, emitting final ack");
                effects.push(ReassemblerEffect::Complete { message, ack });
                to_remove.push(message_id.clone());
                continue;
            }

            if now.duration_since(buf.received_at) <= self.timeout {
                continue;
            }

            // A message that just started making progress still only gets
            // this one tick before the stall window tightens again — the
            // counter is reset-and-charged in the same step, not reset and
            // then left at zero for a free extra tick.
            if current_confirmed > buf.last_confirmed {
                buf.last_confirmed = current_confirmed;
                buf.failed_attempts = 1;
            } else {
                buf.failed_attempts += 1;
            }

            if buf.failed_attempts >= STALL_LIMIT {
                let ack = Ack {
                    message_id: message_id.clone(),
                    last_confirmed_segment: buf.last_confirmed,
                    r#final: true,
                };
                info!(message_id = %message_id, "stall limit reached, abandoning message");
                effects.push(ReassemblerEffect::Abandoned { ack });
                to_remove.push(message_id.clone());
            } else {
                let ack = Ack {
                    message_id: message_id.clone(),
                    last_confirmed_segment: buf.last_confirmed,
                    r#final: false,
                };
                debug!(message_id = %message_id, last_confirmed = buf.last_confirmed, "emitting intermediate ack");
                effects.push(ReassemblerEffect::IntermediateAck { ack });
                buf.received_at = now;
            }
        }

        for id in &to_remove {
            buffer.remove(id);
        }

        effects
    }

    #[cfg(test)]
    async fn buffered_len(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fake::FakeClock;
    use std::sync::Arc;

    fn segment(message_id: &str, index: usize, total: usize, payload: &str) -> Segment {
        Segment {
            sender: "earth".to_string(),
            message_id: message_id.to_string(),
            segment_index: index,
            total_segments: total,
            payload: payload.to_string(),
        }
    }

    fn reassembler(timeout: Duration) -> (Arc<Reassembler<FakeClock>>, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        // Reassembler owns a Clock by value; share the same virtual-time
        // anchor with the test by wrapping an `Arc<FakeClock>` as the Clock.
        let r = Arc::new(Reassembler::new(timeout, ArcClock(clock.clone())));
        (r, clock)
    }

    /// `Arc<FakeClock>` forwarding impl so tests can both own and advance
    /// the clock that the Reassembler reads from.
    #[derive(Clone)]
    struct ArcClock(Arc<FakeClock>);
    impl Clock for ArcClock {
        fn now(&self) -> Instant {
            self.0.now()
        }
    }

    // Scenario 1: exact fit, no loss.
    #[tokio::test]
    async fn assembles_on_exact_fit() {
        let (r, _clock) = reassembler(Duration::from_secs(10));
        r.add_segment(segment("m1", 0, 2, "abcd")).await;
        r.add_segment(segment("m1", 1, 2, "efgh")).await;

        let effects = r.check_timeouts_and_assemble().await;
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            ReassemblerEffect::Complete { message, ack } => {
                assert_eq!(message.content, "abcdefgh");
                assert_eq!(ack.last_confirmed_segment, 1);
                assert!(ack.r#final);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
        assert_eq!(r.buffered_len().await, 0);
    }

    // Scenario 3: out-of-order arrival still assembles in index order.
    #[tokio::test]
    async fn assembles_regardless_of_arrival_order() {
        let (r, _clock) = reassembler(Duration::from_secs(10));
        r.add_segment(segment("m3", 1, 2, "world")).await;
        r.add_segment(segment("m3", 0, 2, "hello")).await;

        let effects = r.check_timeouts_and_assemble().await;
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            ReassemblerEffect::Complete { message, .. } => {
                assert_eq!(message.content, "helloworld");
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    // Scenario 4: gap causes intermediate then final ACK.
    #[tokio::test]
    async fn gap_produces_intermediate_then_final_ack() {
        let (r, clock) = reassembler(Duration::from_secs(10));
        r.add_segment(segment("m4", 0, 3, "a")).await;
        r.add_segment(segment("m4", 2, 3, "c")).await;

        clock.advance(Duration::from_secs(11));
        let effects = r.check_timeouts_and_assemble().await;
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            ReassemblerEffect::IntermediateAck { ack } => {
                assert_eq!(ack.last_confirmed_segment, 0);
                assert!(!ack.r#final);
            }
            other => panic!("expected IntermediateAck, got {other:?}"),
        }

        clock.advance(Duration::from_secs(11));
        let effects = r.check_timeouts_and_assemble().await;
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            ReassemblerEffect::Abandoned { ack } => {
                assert_eq!(ack.last_confirmed_segment, 0);
                assert!(ack.r#final);
            }
            other => panic!("expected Abandoned, got {other:?}"),
        }
        assert_eq!(r.buffered_len().await, 0);
    }

    // P2: cumulative-ACK monotonicity across several ticks of the same message.
    #[tokio::test]
    async fn ack_sequence_is_non_decreasing() {
        let (r, clock) = reassembler(Duration::from_secs(5));
        r.add_segment(segment("m5", 0, 4, "a")).await;

        let mut last_seen = -1i64;
        for _ in 0..2 {
            clock.advance(Duration::from_secs(6));
            let effects = r.check_timeouts_and_assemble().await;
            if effects.is_empty() {
                break;
            }
            let confirmed = match &effects[0] {
                ReassemblerEffect::IntermediateAck { ack } => ack.last_confirmed_segment,
                ReassemblerEffect::Abandoned { ack } => ack.last_confirmed_segment,
                ReassemblerEffect::Complete { ack, .. } => ack.last_confirmed_segment,
            };
            assert!(confirmed >= last_seen);
            last_seen = confirmed;
        }
    }

    // P3: at most one final=true ACK, and the entry disappears after it.
    #[tokio::test]
    async fn abandoned_message_is_removed_after_final_ack() {
        let (r, clock) = reassembler(Duration::from_secs(1));
        r.add_segment(segment("m6", 0, 5, "a")).await;

        clock.advance(Duration::from_secs(2));
        r.check_timeouts_and_assemble().await;
        clock.advance(Duration::from_secs(2));
        let effects = r.check_timeouts_and_assemble().await;
        assert!(matches!(&effects[0], ReassemblerEffect::Abandoned { .. }));
        assert_eq!(r.buffered_len().await, 0);

        // Subsequent ticks see nothing further for this message id.
        clock.advance(Duration::from_secs(2));
        let effects = r.check_timeouts_and_assemble().await;
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn empty_message_id_is_dropped() {
        let (r, _clock) = reassembler(Duration::from_secs(10));
        r.add_segment(segment("", 0, 1, "x")).await;
        assert_eq!(r.buffered_len().await, 0);
    }

    #[tokio::test]
    async fn mismatched_total_segments_is_rejected() {
        let (r, _clock) = reassembler(Duration::from_secs(10));
        r.add_segment(segment("m7", 0, 2, "a")).await;
        r.add_segment(segment("m7", 1, 3, "b")).await;

        let effects = r.check_timeouts_and_assemble().await;
        // Only segment 0 ever landed; the mismatched segment was dropped.
        assert!(effects.is_empty());
        assert_eq!(r.buffered_len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_index_overwrites_previous_payload() {
        let (r, _clock) = reassembler(Duration::from_secs(10));
        r.add_segment(segment("m8", 0, 1, "first")).await;
        r.add_segment(segment("m8", 0, 1, "second")).await;

        let effects = r.check_timeouts_and_assemble().await;
        match &effects[0] {
            ReassemblerEffect::Complete { message, .. } => {
                assert_eq!(message.content, "second");
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }
}
