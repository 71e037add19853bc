//! Middleware: request tracking and the edge response cache.

pub mod edge_cache;
pub mod request_tracking;

pub use edge_cache::edge_cache_middleware;
pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};
