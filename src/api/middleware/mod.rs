// Middleware module - request tracing, CORS and rate limiting

pub mod cors;
pub mod observability;
pub mod rate_limit;

// Re-export for convenience
pub use cors::create_cors_layer;
pub use observability::{init_tracing, trace_layer};
