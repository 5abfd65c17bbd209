//! Collaborators the cache consumes but does not implement: the installed-app
//! directory, the icon renderer, the system environment and the per-type caching
//! strategy.

use crate::cache::{BitmapInfo, ComponentName, FlagOp, IconBitmap, UserHandle};

/// Include packages that are installed for another profile only.
pub const MATCH_UNINSTALLED_PACKAGES: u32 = 0x0000_2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserKind {
    Main,
    Work,
    Clone,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIconInfo {
    pub user: UserHandle,
    pub kind: UserKind,
    pub serial: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconOptions {
    pub user: UserIconInfo,
    pub is_instant_app: bool,
}

impl IconOptions {
    pub fn for_user(user: UserIconInfo) -> Self {
        Self {
            user,
            is_instant_app: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub package_name: String,
    pub version_code: i64,
    /// Milliseconds since the epoch.
    pub last_update_time: i64,
    pub label: Option<String>,
    pub icon: Option<IconBitmap>,
    pub is_instant_app: bool,
}

pub trait AppDirectory: Send + Sync {
    /// `None` when the package is not installed for `user`.
    fn package_info(&self, package: &str, user: UserHandle, flags: u32) -> Option<PackageInfo>;

    fn serial_number_for_user(&self, user: UserHandle) -> i64;

    fn load_icon(&self, info: &PackageInfo) -> Option<IconBitmap> {
        info.icon.clone()
    }

    fn load_label(&self, info: &PackageInfo) -> String {
        info.label
            .clone()
            .unwrap_or_else(|| info.package_name.clone())
    }

    fn user_info(&self, user: UserHandle) -> UserIconInfo {
        UserIconInfo {
            user,
            kind: UserKind::Main,
            serial: self.serial_number_for_user(user),
        }
    }

    /// Accessibility label for `label` as shown in `user`'s profile.
    fn user_badged_label(&self, label: &str, _user: UserHandle) -> String {
        label.to_string()
    }
}

pub trait IconRenderer: Send + Sync {
    fn create_badged_icon_bitmap(&self, raw: &IconBitmap, options: &IconOptions) -> BitmapInfo;

    fn make_default_icon(&self, options: &IconOptions) -> BitmapInfo;

    fn bitmap_flag_op(&self, options: &IconOptions) -> FlagOp;
}

pub trait SystemEnvironment: Send + Sync {
    /// Enabled locales, most preferred first.
    fn locale_tags(&self) -> Vec<String>;

    fn platform_version(&self) -> u32;

    /// Fingerprint stored with rows of `package`. Sideloaded or virtualized
    /// packages can depend on more state than the global fingerprint covers.
    fn package_fingerprint(&self, _package: &str, global: &str) -> String {
        global.to_string()
    }
}

/// How one type of live platform object (activity, shortcut, app record) is
/// turned into cache content.
pub trait CachingLogic<T> {
    fn component(&self, object: &T) -> ComponentName;

    fn user(&self, object: &T) -> UserHandle;

    fn label(&self, object: &T) -> Option<String>;

    fn load_icon(&self, renderer: &dyn IconRenderer, object: &T) -> BitmapInfo;

    fn keywords(&self, _object: &T, _locales: &[String]) -> Option<String> {
        None
    }

    fn last_updated(&self, _object: &T, info: &PackageInfo) -> i64 {
        info.last_update_time
    }

    fn add_to_memory_cache(&self) -> bool {
        true
    }
}
