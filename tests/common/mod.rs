#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use iconcache::cache::{FlagOp, IconBitmap, FLAG_WORK};
use iconcache::platform::{
    AppDirectory, CachingLogic, IconOptions, IconRenderer, PackageInfo, SystemEnvironment,
    UserIconInfo, UserKind,
};
use iconcache::{
    BitmapInfo, CacheEntry, ComponentKey, ComponentName, IconCache, IconCacheConfig, UserHandle,
};
use rusqlite::ToSql;
use tempfile::TempDir;

pub const MAIN_USER: UserHandle = UserHandle(0);
pub const WORK_USER: UserHandle = UserHandle(10);

/// Serial numbers differ from handles so tests catch mixing them up.
pub fn serial_for(user: UserHandle) -> i64 {
    i64::from(user.0) + 100
}

#[derive(Default)]
pub struct FakeDirectory {
    packages: Mutex<HashMap<(String, UserHandle), PackageInfo>>,
    pub package_lookups: AtomicUsize,
}

impl FakeDirectory {
    pub fn install(&self, user: UserHandle, info: PackageInfo) {
        self.packages
            .lock()
            .unwrap()
            .insert((info.package_name.clone(), user), info);
    }

    pub fn uninstall(&self, package: &str, user: UserHandle) {
        self.packages
            .lock()
            .unwrap()
            .remove(&(package.to_string(), user));
    }

    pub fn lookups(&self) -> usize {
        self.package_lookups.load(Ordering::SeqCst)
    }
}

impl AppDirectory for FakeDirectory {
    fn package_info(&self, package: &str, user: UserHandle, _flags: u32) -> Option<PackageInfo> {
        self.package_lookups.fetch_add(1, Ordering::SeqCst);
        self.packages
            .lock()
            .unwrap()
            .get(&(package.to_string(), user))
            .cloned()
    }

    fn serial_number_for_user(&self, user: UserHandle) -> i64 {
        serial_for(user)
    }

    fn user_info(&self, user: UserHandle) -> UserIconInfo {
        UserIconInfo {
            user,
            kind: if user == WORK_USER {
                UserKind::Work
            } else {
                UserKind::Main
            },
            serial: serial_for(user),
        }
    }

    fn user_badged_label(&self, label: &str, user: UserHandle) -> String {
        if user == WORK_USER {
            format!("Work {label}")
        } else {
            label.to_string()
        }
    }
}

pub struct FakeRenderer;

impl IconRenderer for FakeRenderer {
    fn create_badged_icon_bitmap(&self, raw: &IconBitmap, _options: &IconOptions) -> BitmapInfo {
        let px = raw.pixels();
        let color = u32::from_be_bytes([0, px[0], px[1], px[2]]);
        BitmapInfo::high_res(raw.clone(), color)
    }

    fn make_default_icon(&self, _options: &IconOptions) -> BitmapInfo {
        BitmapInfo::high_res(IconBitmap::solid(8, 8, [128, 128, 128, 255]), 0xFF80_8080)
    }

    fn bitmap_flag_op(&self, options: &IconOptions) -> FlagOp {
        match options.user.kind {
            UserKind::Work => FlagOp::NO_OP.add_flag(FLAG_WORK),
            _ => FlagOp::NO_OP.remove_flag(FLAG_WORK),
        }
    }
}

pub struct FakeEnvironment {
    pub locales: Mutex<Vec<String>>,
}

impl Default for FakeEnvironment {
    fn default() -> Self {
        Self {
            locales: Mutex::new(vec!["en-US".into()]),
        }
    }
}

impl SystemEnvironment for FakeEnvironment {
    fn locale_tags(&self) -> Vec<String> {
        self.locales.lock().unwrap().clone()
    }

    fn platform_version(&self) -> u32 {
        34
    }
}

/// A launchable activity as the platform would report it.
#[derive(Debug, Clone)]
pub struct TestActivity {
    pub component: ComponentName,
    pub user: UserHandle,
    pub label: Option<String>,
    pub icon: Option<IconBitmap>,
    pub last_updated: i64,
}

impl TestActivity {
    pub fn new(flat: &str, user: UserHandle, label: &str, size: u32) -> Self {
        Self {
            component: ComponentName::unflatten(flat).expect("component"),
            user,
            label: Some(label.into()),
            icon: Some(IconBitmap::solid(size, size, [30, 60, 90, 255])),
            last_updated: 1_000,
        }
    }

    pub fn key(&self) -> ComponentKey {
        ComponentKey::new(self.component.clone(), self.user)
    }
}

#[derive(Default)]
pub struct ActivityLogic {
    pub icon_loads: AtomicUsize,
}

impl ActivityLogic {
    pub fn loads(&self) -> usize {
        self.icon_loads.load(Ordering::SeqCst)
    }
}

impl CachingLogic<TestActivity> for ActivityLogic {
    fn component(&self, object: &TestActivity) -> ComponentName {
        object.component.clone()
    }

    fn user(&self, object: &TestActivity) -> UserHandle {
        object.user
    }

    fn label(&self, object: &TestActivity) -> Option<String> {
        object.label.clone()
    }

    fn load_icon(&self, renderer: &dyn IconRenderer, object: &TestActivity) -> BitmapInfo {
        self.icon_loads.fetch_add(1, Ordering::SeqCst);
        match &object.icon {
            Some(icon) => renderer.create_badged_icon_bitmap(
                icon,
                &IconOptions::for_user(UserIconInfo {
                    user: object.user,
                    kind: UserKind::Main,
                    serial: serial_for(object.user),
                }),
            ),
            None => BitmapInfo::placeholder(),
        }
    }

    fn keywords(&self, object: &TestActivity, locales: &[String]) -> Option<String> {
        object
            .label
            .as_ref()
            .map(|label| format!("{} {}", label.to_lowercase(), locales.join(" ")))
    }

    fn last_updated(&self, object: &TestActivity, _info: &PackageInfo) -> i64 {
        object.last_updated
    }
}

pub fn package(name: &str, version_code: i64) -> PackageInfo {
    PackageInfo {
        package_name: name.into(),
        version_code,
        last_update_time: 1_000,
        label: Some(format!("{name} app")),
        icon: Some(IconBitmap::solid(32, 32, [200, 100, 50, 255])),
        is_instant_app: false,
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub cache: Arc<IconCache>,
    pub directory: Arc<FakeDirectory>,
    pub environment: Arc<FakeEnvironment>,
    pub logic: Arc<ActivityLogic>,
}

impl Harness {
    pub fn new(memory_cache_enabled: bool) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let directory = Arc::new(FakeDirectory::default());
        let environment = Arc::new(FakeEnvironment::default());
        let cache = Self::open(&dir, &directory, &environment, memory_cache_enabled, 192);
        Self {
            dir,
            cache,
            directory,
            environment,
            logic: Arc::new(ActivityLogic::default()),
        }
    }

    pub fn open(
        dir: &TempDir,
        directory: &Arc<FakeDirectory>,
        environment: &Arc<FakeEnvironment>,
        memory_cache_enabled: bool,
        icon_pixel_size: u32,
    ) -> Arc<IconCache> {
        IconCache::new(
            IconCacheConfig {
                db_path: dir.path().join("app_icons.db"),
                icon_dpi: 480,
                icon_pixel_size,
                memory_cache_enabled,
                worker_name: "test-icon-cache".into(),
            },
            directory.clone(),
            Arc::new(FakeRenderer),
            environment.clone(),
        )
        .expect("icon cache")
    }

    /// A second cache instance over the same database file.
    pub fn reopen(&self, memory_cache_enabled: bool) -> Arc<IconCache> {
        Self::open(
            &self.dir,
            &self.directory,
            &self.environment,
            memory_cache_enabled,
            192,
        )
    }

    pub fn on_worker<F, T>(&self, task: F) -> T
    where
        F: FnOnce(&IconCache) -> T + Send + 'static,
        T: Send + 'static,
    {
        run_on_worker(&self.cache, task)
    }

    /// Eagerly caches `activity`, installing its package first.
    pub fn add(&self, activity: &TestActivity, version_code: i64) -> bool {
        let info = package(activity.component.package(), version_code);
        self.directory.install(activity.user, info.clone());
        let activity = activity.clone();
        let logic = self.logic.clone();
        self.on_worker(move |cache| {
            cache.add_icon_to_db_and_mem_cache(
                &activity,
                logic.as_ref(),
                &info,
                serial_for(activity.user),
                true,
            )
        })
    }

    pub fn get(
        &self,
        key: &ComponentKey,
        live: Option<TestActivity>,
        use_low_res: bool,
    ) -> CacheEntry {
        let key = key.clone();
        let logic = self.logic.clone();
        self.on_worker(move |cache| {
            cache.get_entry(&key, move || live, logic.as_ref(), true, use_low_res)
        })
    }

    pub fn row_count(&self, flat: &str, user: UserHandle) -> usize {
        let flat = flat.to_string();
        let serial = serial_for(user);
        self.on_worker(move |cache| {
            cache
                .query_cache_db(
                    &["componentName"],
                    Some("componentName = ?1 AND profileId = ?2"),
                    &[&flat as &dyn ToSql, &serial],
                )
                .expect("query")
                .len()
        })
    }
}

pub fn run_on_worker<F, T>(cache: &Arc<IconCache>, task: F) -> T
where
    F: FnOnce(&IconCache) -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = Arc::clone(cache);
    cache
        .worker()
        .execute_blocking(move || task(&handle))
        .expect("worker task")
}
