//! HTTP API handlers for fr-rank

pub mod health;
pub mod rank;

pub use health::health_routes;
pub use rank::{friend_rank, friend_sort, rank_routes};
