//! Resolution of entries that are not usable from memory: persistent lookup,
//! live rendering, package and default-icon fallbacks, and write-through.
//!
//! Collaborator code (suppliers, caching logic, directory, renderer,
//! environment) may call back into the cache, so no `CacheState` borrow is
//! held across any of those calls.

use std::cell::RefCell;
use std::sync::Arc;

use log::{debug, warn};

use crate::db::{helpers::decode_bitmap, IconRow, Projection};
use crate::platform::{
    AppDirectory, CachingLogic, IconOptions, IconRenderer, PackageInfo, SystemEnvironment,
    MATCH_UNINSTALLED_PACKAGES,
};

use super::engine::CacheState;
use super::entry::{BitmapInfo, CacheEntry, ComponentKey, FlagOp, Resolution, UserHandle};

/// Calls its supplier at most once, on first use.
struct LiveObject<T, F> {
    supplier: Option<F>,
    object: Option<T>,
}

impl<T, F> LiveObject<T, F>
where
    F: FnOnce() -> Option<T>,
{
    fn new(supplier: F) -> Self {
        Self {
            supplier: Some(supplier),
            object: None,
        }
    }

    fn get(&mut self) -> Option<&T> {
        if let Some(supplier) = self.supplier.take() {
            self.object = supplier();
        }
        self.object.as_ref()
    }

    /// The object if it was already fetched; never calls the supplier.
    fn fetched(&self) -> Option<&T> {
        self.object.as_ref()
    }
}

pub(crate) struct Resolver<'a> {
    pub(crate) state: &'a RefCell<CacheState>,
    pub(crate) directory: &'a dyn AppDirectory,
    pub(crate) renderer: &'a dyn IconRenderer,
    pub(crate) environment: &'a dyn SystemEnvironment,
}

impl Resolver<'_> {
    fn cached(&self, key: &ComponentKey, use_low_res: bool) -> Option<CacheEntry> {
        self.state
            .borrow()
            .memory
            .get(key)
            .filter(|entry| !entry.bitmap.is_null_or_low_res() || use_low_res)
    }

    fn memoize(&self, key: ComponentKey, entry: CacheEntry) {
        self.state.borrow_mut().memory.put(key, entry);
    }

    pub(crate) fn resolve<T, F, L>(
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
        if let Some(entry) = self.cached(key, use_low_res) {
            return entry;
        }

        let mut entry = CacheEntry::default();
        let mut live = LiveObject::new(supplier);

        let mut resolution = if self.entry_from_db(key, &mut entry, use_low_res) {
            Resolution::DbHit
        } else if let Some(object) = live.get() {
            entry.bitmap = logic.load_icon(self.renderer, object);
            Resolution::LiveResolved
        } else {
            let mut resolution = Resolution::DefaultFallback;
            if use_package_icon {
                let package_entry = self.package_entry(key.component.package(), key.user, false);
                if !package_entry.bitmap.is_null_or_low_res() {
                    debug!("Using package icon for {key}");
                    entry.bitmap = package_entry.bitmap;
                    entry.title = package_entry.title;
                    entry.content_description = package_entry.content_description;
                    resolution = Resolution::PackageFallback;
                }
            }
            resolution
        };

        if entry.bitmap.is_placeholder() {
            entry.bitmap = self.default_icon(key.user);
            resolution = Resolution::DefaultFallback;
        }

        if entry.title.is_empty() {
            if let Some(object) = live.get() {
                entry.title = logic.label(object).unwrap_or_default();
                entry.content_description =
                    self.directory.user_badged_label(&entry.title, key.user);
            }
        }

        debug!("Resolved {key} via {resolution:?}");

        if resolution == Resolution::DefaultFallback || self.is_default_icon(&entry.bitmap, key.user)
        {
            return entry;
        }

        if resolution != Resolution::DbHit {
            self.write_through(key, &entry, live.fetched(), logic);
        }

        if logic.add_to_memory_cache() {
            self.memoize(key.clone(), entry.clone());
        }
        entry
    }

    /// Package-level fallback entry, built from the app directory when neither
    /// tier has it. Such entries are always persisted.
    pub(crate) fn package_entry(
        &self,
        package: &str,
        user: UserHandle,
        use_low_res: bool,
    ) -> CacheEntry {
        let key = ComponentKey::package_default(package, user);
        if let Some(entry) = self.cached(&key, use_low_res) {
            return entry;
        }

        let mut entry = CacheEntry::default();
        if !self.entry_from_db(&key, &mut entry, use_low_res) {
            match self.load_package_entry(&key, use_low_res) {
                Some(loaded) => entry = loaded,
                None => return entry,
            }
        }

        self.memoize(key, entry.clone());
        entry
    }

    fn load_package_entry(&self, key: &ComponentKey, use_low_res: bool) -> Option<CacheEntry> {
        let package = key.component.package();
        let Some(info) = self
            .directory
            .package_info(package, key.user, MATCH_UNINSTALLED_PACKAGES)
        else {
            debug!("Package {package} not found for {}", key.user);
            return None;
        };
        let raw = self.directory.load_icon(&info)?;

        let options = IconOptions {
            user: self.directory.user_info(key.user),
            is_instant_app: info.is_instant_app,
        };
        let bitmap = self.renderer.create_badged_icon_bitmap(&raw, &options);
        if bitmap.is_null_or_low_res() {
            return None;
        }

        let title = self.directory.load_label(&info);
        let entry = CacheEntry {
            content_description: self.directory.user_badged_label(&title, key.user),
            bitmap,
            title,
        };

        let serial = self.directory.serial_number_for_user(key.user);
        self.persist(key, &entry, serial, &info, info.last_update_time, None);

        if use_low_res {
            Some(CacheEntry {
                bitmap: entry.bitmap.to_low_res(),
                ..entry
            })
        } else {
            Some(entry)
        }
    }

    /// Eager write used when populating from a live enumeration. Returns whether
    /// the object produced a cacheable icon.
    pub(crate) fn add_icon<T, L>(
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
        let key = ComponentKey::new(logic.component(object), logic.user(object));

        let existing = if replace_existing {
            None
        } else {
            self.cached(&key, false)
        };
        let mut entry = existing.unwrap_or_else(|| CacheEntry {
            bitmap: logic.load_icon(self.renderer, object),
            ..CacheEntry::default()
        });

        if entry.bitmap.is_null_or_low_res() || self.is_default_icon(&entry.bitmap, key.user) {
            debug!("Not caching unresolved icon for {key}");
            return false;
        }

        entry.title = logic.label(object).unwrap_or_default();
        entry.content_description = self.directory.user_badged_label(&entry.title, key.user);
        if logic.add_to_memory_cache() {
            self.memoize(key.clone(), entry.clone());
        }

        let locales = self.state.borrow().system_state.locales().to_vec();
        let keywords = logic.keywords(object, &locales);
        let last_updated = logic.last_updated(object, info);
        self.persist(&key, &entry, profile_serial, info, last_updated, keywords);
        true
    }

    pub(crate) fn default_icon(&self, user: UserHandle) -> BitmapInfo {
        if let Some(icon) = self.state.borrow().default_icons.get(&user) {
            return icon.clone();
        }

        let options = IconOptions::for_user(self.directory.user_info(user));
        let flag_op = self.user_flag_op(user);
        let icon = self.renderer.make_default_icon(&options).with_flags(flag_op);
        // A re-entrant call may have memoized one meanwhile; the first one wins.
        self.state
            .borrow_mut()
            .default_icons
            .entry(user)
            .or_insert(icon)
            .clone()
    }

    pub(crate) fn is_default_icon(&self, bitmap: &BitmapInfo, user: UserHandle) -> bool {
        let state = self.state.borrow();
        let default = state
            .default_icons
            .get(&user)
            .and_then(|icon| icon.icon.as_ref());
        match (bitmap.icon.as_ref(), default) {
            (Some(icon), Some(default)) => Arc::ptr_eq(icon, default),
            _ => false,
        }
    }

    pub(crate) fn user_flag_op(&self, user: UserHandle) -> FlagOp {
        if let Some(op) = self.state.borrow().flag_ops.get(&user) {
            return *op;
        }

        let op = self
            .renderer
            .bitmap_flag_op(&IconOptions::for_user(self.directory.user_info(user)));
        *self.state.borrow_mut().flag_ops.entry(user).or_insert(op)
    }

    fn entry_from_db(&self, key: &ComponentKey, entry: &mut CacheEntry, low_res: bool) -> bool {
        let serial = self.directory.serial_number_for_user(key.user);
        let projection = if low_res {
            Projection::LowRes
        } else {
            Projection::HighRes
        };

        let queried = match self.state.borrow().store.as_ref() {
            Some(store) => store.query_entry(&key.component.flatten(), serial, projection),
            None => return false,
        };
        let stored = match queried {
            Ok(Some(stored)) => stored,
            Ok(None) => return false,
            Err(err) => {
                warn!("Icon cache read failed for {key}: {err:#}");
                return false;
            }
        };

        let bitmap = if low_res {
            BitmapInfo::low_res(stored.icon_color, stored.flags)
        } else {
            match decode_bitmap(
                stored.icon.as_deref(),
                stored.mono_icon.as_deref(),
                stored.icon_color,
                stored.flags,
            ) {
                Ok(bitmap) => bitmap,
                Err(err) => {
                    warn!("Ignoring unreadable icon row for {key}: {err:#}");
                    return false;
                }
            }
        };

        let flag_op = self.user_flag_op(key.user);
        entry.bitmap = bitmap.with_flags(flag_op);
        entry.title = stored.label.unwrap_or_default();
        entry.content_description = if entry.title.is_empty() {
            String::new()
        } else {
            self.directory.user_badged_label(&entry.title, key.user)
        };
        true
    }

    fn write_through<T, L>(
        &self,
        key: &ComponentKey,
        entry: &CacheEntry,
        object: Option<&T>,
        logic: &L,
    ) where
        L: CachingLogic<T> + ?Sized,
    {
        if !entry.bitmap.is_high_res() {
            return;
        }
        let Some(info) = self
            .directory
            .package_info(key.component.package(), key.user, 0)
        else {
            debug!("Not persisting {key}: package is not installed");
            return;
        };

        let (last_updated, keywords) = match object {
            Some(object) => {
                let locales = self.state.borrow().system_state.locales().to_vec();
                (
                    logic.last_updated(object, &info),
                    logic.keywords(object, &locales),
                )
            }
            None => (info.last_update_time, None),
        };
        let serial = self.directory.serial_number_for_user(key.user);
        self.persist(key, entry, serial, &info, last_updated, keywords);
    }

    fn persist(
        &self,
        key: &ComponentKey,
        entry: &CacheEntry,
        profile_serial: i64,
        info: &PackageInfo,
        last_updated: i64,
        keywords: Option<String>,
    ) {
        let tracker = self.state.borrow().system_state.clone();
        let system_state =
            tracker.fingerprint_for_package(self.environment, key.component.package());
        let row = match IconRow::from_bitmap(
            &key.component,
            profile_serial,
            &entry.bitmap,
            &entry.title,
            system_state,
            last_updated,
            info.version_code,
            keywords,
        ) {
            Ok(row) => row,
            Err(err) => {
                warn!("Failed to encode icon for {key}: {err:#}");
                return;
            }
        };

        let state = self.state.borrow();
        let Some(store) = state.store.as_ref() else {
            return;
        };
        if let Err(err) = store.insert_or_replace(&row) {
            warn!("Failed to persist icon for {key}: {err:#}");
        }
    }
}
