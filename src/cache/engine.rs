use std::{cell::RefCell, collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rusqlite::{types::Value, ToSql};

use crate::db::{schema_version, IconDatabase, RowFreshness};
use crate::platform::{AppDirectory, CachingLogic, IconRenderer, PackageInfo, SystemEnvironment};
use crate::settings::IconCacheConfig;
use crate::worker::IconWorker;

use super::entry::{BitmapInfo, CacheEntry, ComponentKey, ComponentName, FlagOp, UserHandle};
use super::memory::{memory_cache, MemoryCache};
use super::resolver::Resolver;
use super::system_state::SystemStateTracker;
use super::update_handler::UpdateHandler;

/// Everything guarded by the cache's instance mutex. Borrows of it are never
/// held across calls into collaborator code.
pub(crate) struct CacheState {
    pub(crate) memory: Box<dyn MemoryCache>,
    pub(crate) store: Option<IconDatabase>,
    pub(crate) default_icons: HashMap<UserHandle, BitmapInfo>,
    pub(crate) flag_ops: HashMap<UserHandle, FlagOp>,
    pub(crate) system_state: SystemStateTracker,
    pub(crate) icon_dpi: u32,
    pub(crate) icon_pixel_size: u32,
}

/// Two-tier icon and label cache confined to one worker thread.
///
/// Methods documented as worker-only panic when called from any other thread;
/// submit them through [`IconCache::worker`]. The remaining methods may be
/// called from anywhere and serialize on the instance mutex, which is
/// re-entrant: collaborators invoked during a resolution may call back into
/// the cache on the same thread.
pub struct IconCache {
    worker: IconWorker,
    directory: Arc<dyn AppDirectory>,
    renderer: Arc<dyn IconRenderer>,
    environment: Arc<dyn SystemEnvironment>,
    db_path: PathBuf,
    state: ReentrantMutex<RefCell<CacheState>>,
}

impl IconCache {
    pub fn new(
        config: IconCacheConfig,
        directory: Arc<dyn AppDirectory>,
        renderer: Arc<dyn IconRenderer>,
        environment: Arc<dyn SystemEnvironment>,
    ) -> Result<Arc<Self>> {
        let worker = IconWorker::spawn(&config.worker_name)?;
        let store = IconDatabase::open(&config.db_path, schema_version(config.icon_pixel_size)?)?;
        let system_state = SystemStateTracker::compute(environment.as_ref());

        info!(
            "Icon cache ready (dpi {}, pixel size {}, memory cache {})",
            config.icon_dpi,
            config.icon_pixel_size,
            if config.memory_cache_enabled { "on" } else { "off" }
        );

        Ok(Arc::new(Self {
            worker,
            directory,
            renderer,
            environment,
            db_path: config.db_path,
            state: ReentrantMutex::new(RefCell::new(CacheState {
                memory: memory_cache(config.memory_cache_enabled),
                store: Some(store),
                default_icons: HashMap::new(),
                flag_ops: HashMap::new(),
                system_state,
                icon_dpi: config.icon_dpi,
                icon_pixel_size: config.icon_pixel_size,
            })),
        }))
    }

    pub fn worker(&self) -> &IconWorker {
        &self.worker
    }

    pub(crate) fn directory(&self) -> &dyn AppDirectory {
        self.directory.as_ref()
    }

    fn lock_state(&self) -> ReentrantMutexGuard<'_, RefCell<CacheState>> {
        self.state.lock()
    }

    fn resolver<'a>(&'a self, state: &'a RefCell<CacheState>) -> Resolver<'a> {
        Resolver {
            state,
            directory: self.directory.as_ref(),
            renderer: self.renderer.as_ref(),
            environment: self.environment.as_ref(),
        }
    }

    /// Main read path. Worker only.
    ///
    /// Returns a high-res entry unless `use_low_res` is set and nothing better is
    /// already cached. `supplier` is called at most once, and only when neither
    /// tier can answer.
    pub fn get_entry<T, F, L>(
        &self,
        key: &ComponentKey,
        supplier: F,
        logic: &L,
        use_package_icon: bool,
        use_low_res: bool,
    ) -> CacheEntry
    where
        F: FnOnce() -> Option<T>,
        L: CachingLogic<T> + ?Sized,
    {
        self.worker.assert_current();
        let state = self.lock_state();
        self.resolver(&state)
            .resolve(key, supplier, logic, use_package_icon, use_low_res)
    }

    /// Package-level fallback entry for `package`. Worker only.
    pub fn get_package_entry(
        &self,
        package: &str,
        user: UserHandle,
        use_low_res: bool,
    ) -> CacheEntry {
        self.worker.assert_current();
        let state = self.lock_state();
        self.resolver(&state)
            .package_entry(package, user, use_low_res)
    }

    pub fn get_default_icon(&self, user: UserHandle) -> BitmapInfo {
        let state = self.lock_state();
        self.resolver(&state).default_icon(user)
    }

    pub fn is_default_icon(&self, bitmap: &BitmapInfo, user: UserHandle) -> bool {
        let state = self.lock_state();
        self.resolver(&state).is_default_icon(bitmap, user)
    }

    pub fn user_flag_op(&self, user: UserHandle) -> FlagOp {
        let state = self.lock_state();
        self.resolver(&state).user_flag_op(user)
    }

    /// Drops one entry from memory. Worker only.
    pub fn remove(&self, component: &ComponentName, user: UserHandle) {
        self.worker.assert_current();
        self.lock_state()
            .borrow_mut()
            .memory
            .remove(&ComponentKey::new(component.clone(), user));
    }

    /// Drops every entry of `package` for `user` from both tiers.
    pub fn remove_package(&self, package: &str, user: UserHandle) {
        let serial = self.directory.serial_number_for_user(user);
        let guard = self.lock_state();
        let mut state = guard.borrow_mut();
        state.memory.remove_all_for_package(package, user);
        if let Some(store) = state.store.as_ref() {
            match store.delete_package(package, serial) {
                Ok(deleted) => info!("Removed {deleted} cached icons of {package} for {user}"),
                Err(err) => warn!("Failed to remove cached icons of {package}: {err:#}"),
            }
        }
    }

    pub fn clear(&self) {
        let guard = self.lock_state();
        let mut state = guard.borrow_mut();
        state.memory.clear();
        if let Some(store) = state.store.as_ref() {
            if let Err(err) = store.clear() {
                warn!("Failed to clear icon database: {err:#}");
            }
        }
    }

    /// Schedules a density change on the worker and returns immediately. All
    /// cached data is discarded once it runs.
    pub fn update_icon_params(self: &Arc<Self>, icon_dpi: u32, icon_pixel_size: u32) {
        let _state = self.lock_state();
        let cache = Arc::clone(self);
        if let Err(err) = self
            .worker
            .post(move || cache.apply_icon_params(icon_dpi, icon_pixel_size))
        {
            error!("Failed to schedule icon parameter update: {err:#}");
        }
    }

    fn apply_icon_params(&self, icon_dpi: u32, icon_pixel_size: u32) {
        self.worker.assert_current();
        let system_state = SystemStateTracker::compute(self.environment.as_ref());
        let guard = self.lock_state();
        let mut state = guard.borrow_mut();
        state.icon_dpi = icon_dpi;
        state.icon_pixel_size = icon_pixel_size;
        state.default_icons.clear();
        state.flag_ops.clear();

        if let Some(store) = state.store.take() {
            if let Err(err) = store.clear() {
                warn!("Failed to clear icon database: {err:#}");
            }
            if let Err(err) = store.close() {
                warn!("{err:#}");
            }
        }

        state.store = match schema_version(icon_pixel_size)
            .and_then(|version| IconDatabase::open(&self.db_path, version))
        {
            Ok(store) => Some(store),
            Err(err) => {
                error!("Icon database unavailable after parameter update: {err:#}");
                None
            }
        };
        state.system_state = system_state;
        state.memory.clear();

        info!("Icon parameters updated (dpi {icon_dpi}, pixel size {icon_pixel_size})");
    }

    /// Recomputes the fingerprint after a locale or platform change.
    pub fn refresh_system_state(&self) {
        let system_state = SystemStateTracker::compute(self.environment.as_ref());
        self.lock_state().borrow_mut().system_state = system_state;
    }

    pub fn system_state(&self) -> String {
        self.lock_state()
            .borrow()
            .system_state
            .current_fingerprint()
            .to_string()
    }

    pub(crate) fn package_fingerprint(&self, package: &str) -> String {
        let tracker = self.lock_state().borrow().system_state.clone();
        tracker.fingerprint_for_package(self.environment.as_ref(), package)
    }

    pub fn icon_dpi(&self) -> u32 {
        self.lock_state().borrow().icon_dpi
    }

    pub fn icon_pixel_size(&self) -> u32 {
        self.lock_state().borrow().icon_pixel_size
    }

    /// Renders `object` and writes it to both tiers. Worker only.
    ///
    /// An existing high-res memory entry is reused unless `replace_existing` is
    /// set. Objects that produce no icon are not cached; returns whether the
    /// object was cached.
    pub fn add_icon_to_db_and_mem_cache<T, L>(
        &self,
        object: &T,
        logic: &L,
        info: &PackageInfo,
        profile_serial: i64,
        replace_existing: bool,
    ) -> bool
    where
        L: CachingLogic<T> + ?Sized,
    {
        self.worker.assert_current();
        let state = self.lock_state();
        self.resolver(&state)
            .add_icon(object, logic, info, profile_serial, replace_existing)
    }

    /// Raw read of the persistent table for inspection tooling. Worker only.
    pub fn query_cache_db(
        &self,
        columns: &[&str],
        selection: Option<&str>,
        args: &[&dyn ToSql],
    ) -> Result<Vec<Vec<Value>>> {
        self.worker.assert_current();
        let guard = self.lock_state();
        let state = guard.borrow();
        let store = state
            .store
            .as_ref()
            .ok_or_else(|| anyhow!("icon database is unavailable"))?;
        store.query(columns, selection, args)
    }

    /// Starts a bulk re-validation pass. The handler must be driven on the worker.
    pub fn update_handler(self: &Arc<Self>) -> UpdateHandler {
        UpdateHandler::new(Arc::clone(self))
    }

    pub(crate) fn rows_for_profile(&self, profile_serial: i64) -> Result<Vec<RowFreshness>> {
        self.worker.assert_current();
        let guard = self.lock_state();
        let state = guard.borrow();
        let store = state
            .store
            .as_ref()
            .ok_or_else(|| anyhow!("icon database is unavailable"))?;
        store.rows_for_profile(profile_serial)
    }

    pub(crate) fn remove_row(
        &self,
        flat_component: &str,
        user: UserHandle,
        profile_serial: i64,
    ) -> Result<()> {
        self.worker.assert_current();
        let guard = self.lock_state();
        let mut state = guard.borrow_mut();
        if let Some(component) = ComponentName::unflatten(flat_component) {
            state.memory.remove(&ComponentKey::new(component, user));
        }
        if let Some(store) = state.store.as_ref() {
            store.delete_row(flat_component, profile_serial)?;
        }
        Ok(())
    }

    /// Entries currently held in memory.
    pub fn memory_len(&self) -> usize {
        self.lock_state().borrow().memory.len()
    }

    /// The entry held in memory for `key`, without resolving anything.
    pub fn peek_memory(&self, key: &ComponentKey) -> Option<CacheEntry> {
        self.lock_state().borrow().memory.get(key)
    }
}
