//! fr-rank library - friend rank service
//!
//! Ranks the identities that appear in a subject's recent feed by how often
//! they appear, serving complete or in-progress results through a tiered
//! result cache.

use axum::Router;
use chrono::{DateTime, Utc};
use fr_common::cache::CacheSelector;
use fr_common::config::ServiceConfig;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod feed;
pub mod rank;

pub use crate::error::{ApiError, ApiResult};

use crate::feed::FeedSource;
use crate::rank::{JobConfig, RequestCoordinator, TtlPolicy};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Entry point for rank computations (holds the shared cache and feed client)
    pub coordinator: RequestCoordinator,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(coordinator: RequestCoordinator) -> Self {
        Self {
            coordinator,
            startup_time: Utc::now(),
        }
    }

    /// Wire the coordinator from bootstrap config
    pub fn from_config(
        config: &ServiceConfig,
        feed: Arc<dyn FeedSource>,
        caches: CacheSelector,
    ) -> Self {
        Self::new(RequestCoordinator::new(
            feed,
            caches,
            JobConfig::from(&config.feed),
            TtlPolicy::from(&config.cache),
        ))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::rank_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
