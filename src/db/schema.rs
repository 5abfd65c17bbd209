use anyhow::{anyhow, bail, Context, Result};
use log::info;
use rusqlite::Connection;

pub const TABLE_NAME: &str = "icons";

/// Bumped whenever the row format changes.
pub const RELEASE_VERSION: i32 = 34;

/// Largest pixel size that fits below the release bits.
pub const MAX_ICON_PIXEL_SIZE: u32 = 0xFFFF;

/// Icon pixel size is part of the schema version, so a density change looks
/// like a schema change and wipes the table.
pub fn schema_version(icon_pixel_size: u32) -> Result<i32> {
    if icon_pixel_size > MAX_ICON_PIXEL_SIZE {
        bail!("icon pixel size {icon_pixel_size} exceeds {MAX_ICON_PIXEL_SIZE}");
    }
    i32::try_from(icon_pixel_size)
        .ok()
        .and_then(|size| (RELEASE_VERSION << 16).checked_add(size))
        .ok_or_else(|| anyhow!("icon pixel size {icon_pixel_size} is out of range"))
}

pub fn pixel_size_from_version(version: i32) -> u32 {
    (version & 0xFFFF) as u32
}

pub fn ensure_schema(conn: &mut Connection, schema_version: i32) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version == schema_version {
        conn.execute_batch(include_str!("schemas/icons.sql"))
            .context("failed to execute icons.sql")?;
        return Ok(());
    }

    if version != 0 {
        info!(
            "Icon database version changed from {} to {}; dropping cached icons",
            version, schema_version
        );
    }

    let tx = conn
        .transaction()
        .context("failed to open schema transaction")?;

    tx.execute_batch(&format!("DROP TABLE IF EXISTS {TABLE_NAME}"))
        .context("failed to drop icon table")?;
    tx.execute_batch(include_str!("schemas/icons.sql"))
        .context("failed to execute icons.sql")?;
    tx.pragma_update(None, "user_version", schema_version)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit icon schema")?;

    Ok(())
}
