// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Route table. Kept separate from the handler bodies, mirroring the
//! teacher's `routes.rs`/`handlers.rs` split.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/sendMessage", post(handlers::send_message))
        .route("/transferSegment", post(handlers::transfer_segment))
        .route("/transferAck", post(handlers::transfer_ack))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
