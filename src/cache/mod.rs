pub mod engine;
pub mod entry;
pub mod memory;
mod resolver;
pub mod system_state;
pub mod update_handler;

pub use engine::IconCache;
pub use entry::{
    BitmapInfo, CacheEntry, ComponentKey, ComponentName, FlagOp, IconBitmap, MonoMask,
    Resolution, UserHandle, FLAG_CLONE, FLAG_INSTANT, FLAG_PRIVATE, FLAG_WORK,
    PACKAGE_DEFAULT_CLASS,
};
pub use memory::{memory_cache, MapCache, MemoryCache, NoOpCache};
pub use system_state::{fingerprint, SystemStateTracker};
pub use update_handler::{UpdateHandler, UpdateSummary};
