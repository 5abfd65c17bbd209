//! Row shapes of the `icons` table.

use anyhow::Result;

use crate::cache::{BitmapInfo, ComponentName};
use crate::db::helpers::encode_icon;

const OPAQUE_ALPHA: u32 = 0xFF00_0000;

/// A full row, as written by `IconDatabase::insert_or_replace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconRow {
    pub component: String,
    pub profile_serial: i64,
    pub last_updated: i64,
    pub version: i64,
    pub icon: Option<Vec<u8>>,
    pub mono_icon: Option<Vec<u8>>,
    pub icon_color: u32,
    pub flags: u32,
    pub label: Option<String>,
    pub system_state: String,
    pub keywords: Option<String>,
}

impl IconRow {
    /// Encodes `bitmap` for storage. The accent color is stored fully opaque.
    #[allow(clippy::too_many_arguments)]
    pub fn from_bitmap(
        component: &ComponentName,
        profile_serial: i64,
        bitmap: &BitmapInfo,
        title: &str,
        system_state: String,
        last_updated: i64,
        version: i64,
        keywords: Option<String>,
    ) -> Result<Self> {
        let icon = bitmap.icon.as_deref().map(encode_icon).transpose()?;
        let mono_icon = bitmap.mono.as_ref().map(|mask| mask.alpha().to_vec());

        Ok(Self {
            component: component.flatten(),
            profile_serial,
            last_updated,
            version,
            icon,
            mono_icon,
            icon_color: bitmap.color | OPAQUE_ALPHA,
            flags: bitmap.flags,
            label: (!title.is_empty()).then(|| title.to_string()),
            system_state,
            keywords,
        })
    }
}

/// Columns read through one of the two fixed projections. The blob columns are
/// only populated by the high-res projection.
#[derive(Debug, Clone)]
pub struct StoredIcon {
    pub component: String,
    pub label: Option<String>,
    pub icon_color: u32,
    pub flags: u32,
    pub icon: Option<Vec<u8>>,
    pub mono_icon: Option<Vec<u8>>,
}

/// What the update handler compares against live package data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFreshness {
    pub component: String,
    pub last_updated: i64,
    pub version: i64,
    pub system_state: Option<String>,
}
