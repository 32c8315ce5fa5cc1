pub mod render;
pub mod service;

pub use render::render_snapshot;
pub use service::{RetrievalFilters, RetrievalService, DEGRADED_MATCH_DISCOUNT};
