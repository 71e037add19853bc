//! Edge response cache middleware (spec §4.H): a lowercased-pathname cache
//! lookup ahead of dispatch, a write-through of whatever the handler
//! returned, and an asynchronous secondary write keyed by the resolved
//! player id so a later lookup by either spelling hits the cache.

use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::analytics::{PointInput, RequestMeta};
use crate::state::AppState;

const ERROR_TTL_SECS: u64 = 5 * 60;
const SUCCESS_CACHE_CONTROL: &str = "public, max-age=432000";
const ERROR_CACHE_CONTROL: &str = "public, max-age=300";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    body: serde_json::Value,
    is_error: bool,
}

pub async fn edge_cache_middleware(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_ascii_lowercase();
    let cache_key = format!("edge-{path}");
    let meta = RequestMeta::from_headers(&path, request.headers());
    let request_type = request_type_from_path(&path);

    if let Some(cached) = state.platform.cache.get::<CachedResponse>(&cache_key).await {
        state.analytics.write_point(
            meta,
            PointInput {
                point_type: "request",
                error: cached.is_error,
                request_type,
                cached: true,
                status: cached.status,
                response_time_ms: started.elapsed().as_millis() as u64,
            },
        );
        return build_cached_response(&cached);
    }

    let response = next.run(request).await;
    let status = response.status();
    let (parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, 16 * 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

    let is_error = !status.is_success();
    let ttl_secs = if is_error { ERROR_TTL_SECS } else { state.platform.cache_config.edge_ttl_secs };
    // `error` in the envelope distinguishes user-visible fails from real errors
    // (spec §7); fall back to the HTTP status when the body has neither shape.
    let counts_as_error = json.get("error").and_then(serde_json::Value::as_bool).unwrap_or(is_error);
    let cached = CachedResponse { status: status.as_u16(), body: json.clone(), is_error: counts_as_error };

    let cache = state.platform.cache.clone();
    let key = cache_key.clone();
    let task_id = format!("edge-cache-put:{key}");
    state.platform.background.submit("edge-cache-put", task_id, move |_token| {
        Box::pin(async move {
            cache.put(&key, &cached, std::time::Duration::from_secs(ttl_secs)).await;
            Ok(())
        })
    });

    if !is_error {
        if let Some(player_id) = json.pointer("/data/player/id").and_then(|v| v.as_str()) {
            let secondary_path = with_last_segment_replaced(&path, &player_id.to_ascii_lowercase());
            if secondary_path != path {
                let secondary_key = format!("edge-{secondary_path}");
                let cache = state.platform.cache.clone();
                let secondary_cached = CachedResponse { status: status.as_u16(), body: json.clone(), is_error: false };
                let ttl_secs = state.platform.cache_config.edge_ttl_secs;
                let task_id = format!("edge-cache-put-secondary:{secondary_key}");
                state.platform.background.submit("edge-cache-put-secondary", task_id, move |_token| {
                    Box::pin(async move {
                        cache.put(&secondary_key, &secondary_cached, std::time::Duration::from_secs(ttl_secs)).await;
                        Ok(())
                    })
                });
            }
        }
    }

    state.analytics.write_point(
        meta,
        PointInput {
            point_type: "request",
            error: counts_as_error,
            request_type,
            cached: false,
            status: status.as_u16(),
            response_time_ms: started.elapsed().as_millis() as u64,
        },
    );

    Response::from_parts(parts, Body::from(bytes))
}

/// The platform segment of `/api/player/{platform}/{query}`, or the whole
/// path for non-player routes.
fn request_type_from_path(path: &str) -> String {
    path.split('/').nth(3).unwrap_or(path).to_string()
}

fn build_cached_response(cached: &CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let cache_control = if cached.is_error { ERROR_CACHE_CONTROL } else { SUCCESS_CACHE_CONTROL };

    let mut response = (status, axum::Json(cached.body.clone())).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    headers.insert("x-worker-cache", HeaderValue::from_static("true"));
    response
}

fn with_last_segment_replaced(path: &str, replacement: &str) -> String {
    match path.rfind('/') {
        Some(idx) => format!("{}/{replacement}", &path[..idx]),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_only_the_final_path_segment() {
        assert_eq!(
            with_last_segment_replaced("/api/player/minecraft/cherryjimbo", "ef613480-5b62-44e4-a446-7fbe85d65513"),
            "/api/player/minecraft/ef613480-5b62-44e4-a446-7fbe85d65513"
        );
    }
}
