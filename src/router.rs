//! Route table (spec §4.H, §6): `GET /api/player/{platform}/{query}` behind
//! the edge cache middleware, plus a fallback for the static-asset
//! collaborator the spec references by interface only (spec.md ambient
//! note: asset serving itself is out of scope for this gateway).

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::{GatewayError, Result};
use crate::middleware::edge_cache_middleware;
use crate::model::{Platform, PlayerProfile};
use crate::state::AppState;

const SUCCESS_CACHE_CONTROL: &str = "public, max-age=432000";

/// Wire shape mirroring `ErrorEnvelope` on the success side.
#[derive(Debug, Serialize)]
struct SuccessEnvelope {
    success: bool,
    error: bool,
    code: &'static str,
    message: String,
    data: SuccessData,
}

#[derive(Debug, Serialize)]
struct SuccessData {
    player: PlayerProfile,
}

async fn player_lookup(
    State(state): State<AppState>,
    Path((platform, query)): Path<(String, String)>,
) -> Result<Response> {
    let platform: Platform = platform.parse().map_err(|_| GatewayError::not_found())?;
    let player = crate::platform::lookup(&state.platform, platform, &query).await?;

    let envelope = SuccessEnvelope {
        success: true,
        error: false,
        code: "player.found",
        message: "player found".to_string(),
        data: SuccessData { player },
    };

    let mut response = (StatusCode::OK, Json(envelope)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(SUCCESS_CACHE_CONTROL));
    Ok(response)
}

/// Stand-in for the static-asset collaborator the gateway sits in front of;
/// not part of this service's scope beyond returning a clean 404.
async fn not_found() -> Response {
    GatewayError::not_found().into_response()
}

pub fn build(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/player/{platform}/{query}", get(player_lookup))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), edge_cache_middleware));

    Router::new()
        .merge(api)
        .route("/health", get(crate::health::health))
        .fallback(not_found)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_segment_parses_known_values() {
        assert!("minecraft".parse::<Platform>().is_ok());
        assert!("bogus".parse::<Platform>().is_err());
    }
}
