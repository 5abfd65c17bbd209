//! Two-tier icon and label cache for application components.
//!
//! Entries are keyed by component and user profile, held in memory and
//! persisted in a SQLite table whose schema version carries the icon pixel
//! size. All resolution runs on one confined worker thread; see
//! [`cache::IconCache`].

pub mod cache;
pub mod db;
pub mod platform;
pub mod settings;
pub mod worker;

pub use cache::{
    BitmapInfo, CacheEntry, ComponentKey, ComponentName, IconCache, UpdateHandler, UpdateSummary,
    UserHandle,
};
pub use platform::{AppDirectory, CachingLogic, IconRenderer, PackageInfo, SystemEnvironment};
pub use settings::{CacheSettings, IconCacheConfig};
pub use worker::IconWorker;
