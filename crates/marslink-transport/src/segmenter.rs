// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Splits a message into fixed-size segments. Pure function, no failures.

use crate::model::{Segment, SendMessageRequest};

/// Split `req.message` into `ceil(len / max_segment_size)` segments, each
/// carrying the shared sender, message id, and total segment count.
///
/// Callers are expected to reject an empty message before reaching this
/// function (see the `/sendMessage` handler) — an empty message has no
/// well-defined single-vs-zero-segment answer, and rejecting it at ingress
/// sidesteps the question entirely rather than silently picking one.
pub fn split_message_to_segments(req: &SendMessageRequest, max_segment_size: usize) -> Vec<Segment> {
    let bytes = req.message.as_bytes();
    let total = bytes.len().div_ceil(max_segment_size).max(1);

    (0..total)
        .map(|i| {
            let start = i * max_segment_size;
            let end = (start + max_segment_size).min(bytes.len());
            Segment {
                sender: req.sender.clone(),
                message_id: req.message_id.clone(),
                segment_index: i,
                total_segments: total,
                payload: String::from_utf8_lossy(&bytes[start..end]).into_owned(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(message: &str) -> SendMessageRequest {
        SendMessageRequest {
            sender: "earth".to_string(),
            message: message.to_string(),
            message_id: "m1".to_string(),
        }
    }

    #[test]
    fn exact_fit_splits_evenly() {
        let segments = split_message_to_segments(&req("abcdefgh"), 4);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].payload, "abcd");
        assert_eq!(segments[1].payload, "efgh");
        assert!(segments.iter().all(|s| s.total_segments == 2));
        assert_eq!(segments[0].segment_index, 0);
        assert_eq!(segments[1].segment_index, 1);
    }

    #[test]
    fn non_aligned_size_leaves_a_short_final_segment() {
        let segments = split_message_to_segments(&req("hello"), 3);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].payload, "hel");
        assert_eq!(segments[1].payload, "lo");
    }

    #[test]
    fn single_byte_segment_size_yields_one_segment_per_byte() {
        let segments = split_message_to_segments(&req("ab"), 1);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].payload, "a");
        assert_eq!(segments[1].payload, "b");
    }

    #[test]
    fn oversized_segment_size_yields_a_single_segment() {
        let segments = split_message_to_segments(&req("hi"), 120);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].payload, "hi");
        assert_eq!(segments[0].total_segments, 1);
    }
}
