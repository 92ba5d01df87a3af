// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Outbound HTTP calls to the two applications and the channel. Only the
//! channel-bound ACK forward gets a retry loop — the original service
//! fires the other three and moves on, logging failures rather than
//! propagating them, and this expansion keeps that asymmetry.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

use crate::model::{Ack, FinalAck, Message, Segment};

const CHANNEL_RETRY_ATTEMPTS: u32 = 3;
const CHANNEL_RETRY_DELAY: Duration = Duration::from_secs(3);
const CHANNEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("channel rejected ack after {attempts} attempts: transport error: {source}")]
    Transport {
        attempts: u32,
        source: reqwest::Error,
    },

    #[error("channel rejected ack after {attempts} attempts: last status {status}")]
    RejectedStatus { attempts: u32, status: u16 },
}

/// Shared HTTP egress to Mars, Earth, and the channel.
pub struct OutboundClients {
    client: reqwest::Client,
    app_mars_url: String,
    app_earth_url: String,
    channel_url: String,
    retry_delay: Duration,
}

impl OutboundClients {
    pub fn new(app_mars_url: String, app_earth_url: String, channel_url: String) -> Self {
        Self::with_retry_delay(app_mars_url, app_earth_url, channel_url, CHANNEL_RETRY_DELAY)
    }

    fn with_retry_delay(
        app_mars_url: String,
        app_earth_url: String,
        channel_url: String,
        retry_delay: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CHANNEL_REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            client,
            app_mars_url,
            app_earth_url,
            channel_url,
            retry_delay,
        }
    }

    /// Deliver a fully reassembled message to the Mars-side application.
    /// Fire-and-forget: a failure is logged, not propagated, matching
    /// `SendFinalAck`'s sibling calls in the original.
    pub async fn deliver_message(&self, message: &Message) {
        let url = format!("{}/receiveMessage", self.app_mars_url);
        if let Err(err) = self.client.post(&url).json(message).send().await {
            warn!(error = %err, url, "failed to deliver message to app mars");
        }
    }

    /// Report terminal delivery status to the Earth-side application.
    /// Fire-and-forget, matching `ForwardAckToAppEarth` in the original.
    pub async fn send_final_ack(&self, final_ack: &FinalAck) {
        let url = format!("{}/receiveAck", self.app_earth_url);
        if let Err(err) = self.client.post(&url).json(final_ack).send().await {
            warn!(error = %err, url, "failed to send final ack to app earth");
        }
    }

    /// Forward a segment to the channel peer. Used by the bus consumer to
    /// relay both freshly segmented and re-enqueued (resent) segments.
    /// Fire-and-forget: a dropped segment here is recovered by the
    /// sender's own retransmission policy, not by retrying this call.
    pub async fn send_segment_to_channel(&self, segment: &Segment) {
        let url = format!("{}/processSegment", self.channel_url);
        if let Err(err) = self.client.post(&url).json(segment).send().await {
            warn!(error = %err, url, "failed to forward segment to channel");
        }
    }

    /// Forward a cumulative ACK to the channel peer, retrying a fixed
    /// number of times with a fixed delay before giving up and surfacing
    /// the error. This is the one outbound call spec.md singles out for
    /// retry — everything else is fire-and-forget.
    pub async fn forward_ack_to_channel(&self, ack: &Ack) -> Result<(), OutboundError> {
        let url = format!("{}/processAck", self.channel_url);
        let mut last_err = None;
        let mut last_status = None;

        for attempt in 1..=CHANNEL_RETRY_ATTEMPTS {
            match self.client.post(&url).json(ack).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    warn!(
                        attempt,
                        status = %response.status(),
                        "channel rejected ack, retrying"
                    );
                    last_status = Some(response.status().as_u16());
                }
                Err(err) => {
                    warn!(attempt, error = %err, "channel ack post failed, retrying");
                    last_err = Some(err);
                }
            }
            if attempt < CHANNEL_RETRY_ATTEMPTS {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        error!(url, "channel rejected ack after all retries");
        Err(match last_err {
            Some(source) => OutboundError::Transport {
                attempts: CHANNEL_RETRY_ATTEMPTS,
                source,
            },
            None => OutboundError::RejectedStatus {
                attempts: CHANNEL_RETRY_ATTEMPTS,
                status: last_status.unwrap_or(0),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ack() -> Ack {
        Ack {
            message_id: "m1".to_string(),
            last_confirmed_segment: 0,
            r#final: false,
        }
    }

    fn segment() -> Segment {
        Segment {
            sender: "earth".to_string(),
            message_id: "m1".to_string(),
            segment_index: 0,
            total_segments: 1,
            payload: "hi".to_string(),
        }
    }

    fn test_clients(server: &MockServer) -> OutboundClients {
        OutboundClients::with_retry_delay(
            "http://mars.invalid".to_string(),
            "http://earth.invalid".to_string(),
            server.uri(),
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn channel_ack_post_succeeds_on_first_try() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/processAck"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        test_clients(&server)
            .forward_ack_to_channel(&ack())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn channel_ack_post_recovers_after_a_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/processAck"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/processAck"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        test_clients(&server)
            .forward_ack_to_channel(&ack())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn channel_ack_post_gives_up_after_exhausting_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/processAck"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = test_clients(&server).forward_ack_to_channel(&ack()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn segment_forward_to_channel_is_fire_and_forget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/processSegment"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        // No retry, no propagated error: the call simply returns.
        test_clients(&server).send_segment_to_channel(&segment()).await;
    }
}
