//! Cache-first serving: a SQLite store of finished feeds plus the refresh
//! coordinator that rebuilds them. Request handlers read the store only;
//! builds happen on the refresh path.

pub mod refresh;
pub mod store;

pub use refresh::{next_run_at, run_daily_schedule, RefreshCoordinator, RefreshRun, RefreshState};
pub use store::{cache_key, CacheStore, CachedResponse};
