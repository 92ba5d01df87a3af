// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Segment bus: a Kafka-backed handoff between segment producers (ingress
//! and retransmission) and the one consumer task that relays each segment
//! on to the channel peer over HTTP. Thin by design — the interesting
//! logic lives in [`crate::reassembler`] and [`crate::ack_tracker`].

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message as _;
use thiserror::Error;
use tracing::{error, warn};

use crate::model::Segment;

const SEGMENT_TOPIC: &str = "marslink.segments";

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to build kafka client: {0}")]
    ClientConfig(#[from] KafkaError),

    #[error("failed to publish segment: {0}")]
    Publish(KafkaError),

    #[error("failed to serialize segment: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct SegmentProducer {
    producer: FutureProducer,
}

impl SegmentProducer {
    pub fn new(brokers: &str) -> Result<Self, BusError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self { producer })
    }

    /// Publish one segment, keyed by `messageId` so a single message's
    /// segments always land on the same partition and preserve order.
    pub async fn publish(&self, segment: &Segment) -> Result<(), BusError> {
        let payload = serde_json::to_string(segment)?;
        let record = FutureRecord::to(SEGMENT_TOPIC)
            .key(segment.message_id.as_str())
            .payload(payload.as_str());

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(err, _)| BusError::Publish(err))?;
        Ok(())
    }
}

pub struct SegmentConsumer {
    consumer: StreamConsumer,
}

impl SegmentConsumer {
    pub fn new(brokers: &str, group_id: &str) -> Result<Self, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .create()?;
        consumer.subscribe(&[SEGMENT_TOPIC])?;
        Ok(Self { consumer })
    }

    /// Receive the next segment, blocking the calling task until one
    /// arrives. Malformed payloads and read errors are logged and skipped
    /// rather than ending the consume loop, matching the original
    /// consumer's log-and-continue behavior on a bad read.
    pub async fn recv(&self) -> Segment {
        loop {
            let message = match self.consumer.recv().await {
                Ok(message) => message,
                Err(err) => {
                    error!(error = %err, "kafka consumer read failed, retrying");
                    continue;
                }
            };

            let Some(payload) = message.payload() else {
                warn!("received segment message with no payload, skipping");
                continue;
            };

            match serde_json::from_slice::<Segment>(payload) {
                Ok(segment) => return segment,
                Err(err) => {
                    warn!(error = %err, "failed to decode segment, skipping");
                    continue;
                }
            }
        }
    }
}
