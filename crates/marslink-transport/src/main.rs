// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! marslink-transport: reliable segmented message relay between two
//! transport endpoints across a lossy channel.

mod ack_tracker;
mod bus;
mod clock;
mod config;
mod handlers;
mod model;
mod outbound;
mod reassembler;
mod routes;
mod scheduler;
mod segmenter;

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ack_tracker::AckTracker;
use bus::{SegmentConsumer, SegmentProducer};
use clock::SystemClock;
use config::Config;
use outbound::OutboundClients;
use reassembler::Reassembler;

/// Shared application state, handed to every axum handler and background
/// task behind an `Arc`.
pub struct AppState {
    pub config: Config,
    pub reassembler: Reassembler<SystemClock>,
    pub ack_tracker: AckTracker<SystemClock>,
    pub producer: SegmentProducer,
    pub outbound: OutboundClients,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration, exiting");
            return ExitCode::FAILURE;
        }
    };

    info!(
        port = config.transport_port,
        segment_size = config.segment_size,
        "starting marslink-transport"
    );

    let producer = match SegmentProducer::new(&config.kafka_brokers) {
        Ok(producer) => producer,
        Err(err) => {
            error!(error = %err, "failed to construct kafka producer, exiting");
            return ExitCode::FAILURE;
        }
    };

    let consumer = match SegmentConsumer::new(&config.kafka_brokers, "marslink-transport") {
        Ok(consumer) => consumer,
        Err(err) => {
            error!(error = %err, "failed to construct kafka consumer, exiting");
            return ExitCode::FAILURE;
        }
    };

    let outbound = OutboundClients::new(
        config.app_mars_url.clone(),
        config.app_earth_url.clone(),
        config.channel_url.clone(),
    );

    let state = Arc::new(AppState {
        reassembler: Reassembler::new(config.timeout_duration, SystemClock),
        ack_tracker: AckTracker::new(ack_tracker::ACK_TIMEOUT, SystemClock),
        producer,
        outbound,
        config: config.clone(),
    });

    let shutdown = Arc::new(Notify::new());

    // The bus consumer's only job is to relay each dequeued segment to the
    // channel peer; segments reach this instance's own Reassembler only via
    // the `/transferSegment` ingress route, as the channel forwards them.
    let consumer_task = {
        let state = state.clone();
        tokio::spawn(async move {
            loop {
                let segment = consumer.recv().await;
                let state = state.clone();
                tokio::spawn(async move {
                    state.outbound.send_segment_to_channel(&segment).await;
                });
            }
        })
    };

    let reassembler_ticker =
        scheduler::spawn_reassembler_ticker(state.clone(), config.check_interval, shutdown.clone());
    let ack_tracker_ticker =
        scheduler::spawn_ack_tracker_ticker(state.clone(), config.check_interval, shutdown.clone());

    let router = routes::build_router(state.clone());
    let addr = format!("0.0.0.0:{}", config.transport_port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, addr, "failed to bind listener, exiting");
            shutdown.notify_waiters();
            return ExitCode::FAILURE;
        }
    };

    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            error!(error = %err, "http server exited with an error");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        _ = server => {
            info!("http server task exited");
        }
    }

    shutdown.notify_waiters();
    consumer_task.abort();
    let _ = reassembler_ticker.await;
    let _ = ack_tracker_ticker.await;

    ExitCode::SUCCESS
}
