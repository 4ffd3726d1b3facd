//! Friend rank and friend sort endpoints
//!
//! Query parameters:
//! - `id` (required): subject identity
//! - `token` (required): feed access token
//! - `async` / `progressive`: progressive mode, default true; only a
//!   case-insensitive `true` enables it when given. `progressive` wins when
//!   both are present.
//! - `force`: bypass the cache when present (any value except `false`)
//!
//! Progressive responses are `{"data": ..., "progress": ...}`; blocking
//! responses are the bare data.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::rank::{Identity, RankRequest, ResultVariant};
use crate::AppState;

/// Raw query parameters; validated in [`RankQuery::into_request`]
#[derive(Debug, Default, Deserialize)]
pub struct RankQuery {
    pub id: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "async")]
    pub async_mode: Option<String>,
    pub progressive: Option<String>,
    pub force: Option<String>,
}

impl RankQuery {
    pub fn into_request(self, variant: ResultVariant) -> ApiResult<RankRequest> {
        let identity = self
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing required parameter 'id'".to_string()))?
            .parse::<Identity>()
            .map_err(|_| ApiError::BadRequest("parameter 'id' must be a numeric identity".to_string()))?;

        let credential = self
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing required parameter 'token'".to_string()))?;

        let progressive = match self.progressive.as_deref().or(self.async_mode.as_deref()) {
            Some(value) => value.eq_ignore_ascii_case("true"),
            None => true,
        };

        let bypass_cache = self
            .force
            .as_deref()
            .map_or(false, |value| !value.eq_ignore_ascii_case("false"));

        Ok(RankRequest::new(identity, credential)
            .variant(variant)
            .progressive(progressive)
            .bypass_cache(bypass_cache))
    }
}

/// GET / and GET /rank
pub async fn friend_rank(
    State(state): State<AppState>,
    Query(query): Query<RankQuery>,
) -> ApiResult<Json<Value>> {
    respond(&state, query.into_request(ResultVariant::FriendRank)?).await
}

/// GET /sort
pub async fn friend_sort(
    State(state): State<AppState>,
    Query(query): Query<RankQuery>,
) -> ApiResult<Json<Value>> {
    respond(&state, query.into_request(ResultVariant::FriendSort)?).await
}

async fn respond(state: &AppState, request: RankRequest) -> ApiResult<Json<Value>> {
    let result = state.coordinator.compute(&request).await?;

    if request.progressive {
        Ok(Json(json!({
            "data": result.data,
            "progress": result.progress,
        })))
    } else {
        Ok(Json(result.data))
    }
}

/// Build rank routes
pub fn rank_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(friend_rank))
        .route("/rank", get(friend_rank))
        .route("/sort", get(friend_sort))
}
