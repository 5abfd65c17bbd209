//! Cache keys and the values stored under them.

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};

/// Class name used for the package-level fallback entry of every package.
pub const PACKAGE_DEFAULT_CLASS: &str = ".";

pub const FLAG_WORK: u32 = 1 << 0;
pub const FLAG_INSTANT: u32 = 1 << 1;
pub const FLAG_CLONE: u32 = 1 << 2;
pub const FLAG_PRIVATE: u32 = 1 << 3;

/// Live runtime handle of an OS user/profile. Not stable across installs; the
/// persisted form is the serial number reported by the app directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserHandle(pub u32);

impl fmt::Display for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentName {
    package: String,
    class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }

    pub fn package_default(package: impl Into<String>) -> Self {
        Self::new(package, PACKAGE_DEFAULT_CLASS)
    }

    /// Parses the `"pkg/Class"` form written to the database.
    pub fn unflatten(flat: &str) -> Option<Self> {
        let (package, class) = flat.split_once('/')?;
        if package.is_empty() || class.is_empty() {
            return None;
        }
        Some(Self::new(package, class))
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn is_package_default(&self) -> bool {
        self.class == PACKAGE_DEFAULT_CLASS
    }

    pub fn flatten(&self) -> String {
        format!("{}/{}", self.package, self.class)
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentKey {
    pub component: ComponentName,
    pub user: UserHandle,
}

impl ComponentKey {
    pub fn new(component: ComponentName, user: UserHandle) -> Self {
        Self { component, user }
    }

    pub fn package_default(package: impl Into<String>, user: UserHandle) -> Self {
        Self::new(ComponentName::package_default(package), user)
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.component, self.user)
    }
}

/// Full-resolution RGBA8 pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconBitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl IconBitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            bail!(
                "pixel buffer holds {} bytes, expected {expected} for {width}x{height}",
                pixels.len()
            );
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// One alpha byte per pixel, drawn over themed icons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoMask {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl MonoMask {
    pub fn new(width: u32, height: u32, alpha: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if alpha.len() != expected {
            bail!(
                "monochrome mask holds {} bytes, expected {expected} for {width}x{height}",
                alpha.len()
            );
        }
        Ok(Self {
            width,
            height,
            alpha,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }
}

/// Set/clear transform applied to the flag bits of every bitmap of a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagOp {
    add: u32,
    remove: u32,
}

impl FlagOp {
    pub const NO_OP: FlagOp = FlagOp { add: 0, remove: 0 };

    pub fn add_flag(self, flag: u32) -> Self {
        Self {
            add: self.add | flag,
            remove: self.remove & !flag,
        }
    }

    pub fn remove_flag(self, flag: u32) -> Self {
        Self {
            add: self.add & !flag,
            remove: self.remove | flag,
        }
    }

    pub fn apply(self, flags: u32) -> u32 {
        (flags & !self.remove) | self.add
    }
}

/// Rendered icon data.
///
/// Three shapes exist: a placeholder (no pixels, nothing known), low-res (accent
/// color and flags only) and high-res (pixels, optional mono mask, color, flags).
#[derive(Debug, Clone, Default)]
pub struct BitmapInfo {
    pub icon: Option<Arc<IconBitmap>>,
    pub mono: Option<Arc<MonoMask>>,
    pub color: u32,
    pub flags: u32,
    low_res: bool,
}

impl BitmapInfo {
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn low_res(color: u32, flags: u32) -> Self {
        Self {
            icon: None,
            mono: None,
            color,
            flags,
            low_res: true,
        }
    }

    pub fn high_res(icon: IconBitmap, color: u32) -> Self {
        Self {
            icon: Some(Arc::new(icon)),
            mono: None,
            color,
            flags: 0,
            low_res: false,
        }
    }

    pub fn with_mono(mut self, mono: Option<MonoMask>) -> Self {
        self.mono = mono.map(Arc::new);
        self
    }

    pub fn with_flags(mut self, op: FlagOp) -> Self {
        self.flags = op.apply(self.flags);
        self
    }

    /// Drops the pixel data, keeping color and flags.
    pub fn to_low_res(&self) -> Self {
        Self::low_res(self.color, self.flags)
    }

    pub fn is_placeholder(&self) -> bool {
        self.icon.is_none() && !self.low_res
    }

    pub fn is_low_res(&self) -> bool {
        self.low_res
    }

    pub fn is_high_res(&self) -> bool {
        self.icon.is_some()
    }

    pub fn is_null_or_low_res(&self) -> bool {
        self.icon.is_none()
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.icon.as_ref().map(|icon| (icon.width(), icon.height()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub bitmap: BitmapInfo,
    /// Empty until a label is known.
    pub title: String,
    pub content_description: String,
}

/// How an entry left the `UNRESOLVED` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    DbHit,
    LiveResolved,
    PackageFallback,
    DefaultFallback,
}
