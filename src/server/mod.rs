//! HTTP surface: a small JSON API that serves feeds from the cache and can
//! kick off background refreshes. Handlers never build feeds inline.

pub mod handlers;
pub mod router;

pub use router::{app_router, AppState};
