use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::{error, info};
use rusqlite::{params, types::Value, Connection, OpenFlags, OptionalExtension, Row, ToSql};

pub(crate) mod helpers;
pub mod models;
mod schema;

pub use models::{IconRow, RowFreshness, StoredIcon};
pub use schema::{
    pixel_size_from_version, schema_version, MAX_ICON_PIXEL_SIZE, RELEASE_VERSION, TABLE_NAME,
};

use helpers::to_u32;
use schema::ensure_schema;

pub const COLUMN_COMPONENT: &str = "componentName";
pub const COLUMN_USER: &str = "profileId";
pub const COLUMN_LAST_UPDATED: &str = "lastUpdated";
pub const COLUMN_VERSION: &str = "version";
pub const COLUMN_ICON: &str = "icon";
pub const COLUMN_MONO_ICON: &str = "mono_icon";
pub const COLUMN_ICON_COLOR: &str = "icon_color";
pub const COLUMN_FLAGS: &str = "flags";
pub const COLUMN_LABEL: &str = "label";
pub const COLUMN_SYSTEM_STATE: &str = "system_state";
pub const COLUMN_KEYWORDS: &str = "keywords";

pub const ALL_COLUMNS: [&str; 11] = [
    COLUMN_COMPONENT,
    COLUMN_USER,
    COLUMN_LAST_UPDATED,
    COLUMN_VERSION,
    COLUMN_ICON,
    COLUMN_MONO_ICON,
    COLUMN_ICON_COLOR,
    COLUMN_FLAGS,
    COLUMN_LABEL,
    COLUMN_SYSTEM_STATE,
    COLUMN_KEYWORDS,
];

/// The only two column sets the cache reads entries with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    LowRes,
    HighRes,
}

impl Projection {
    fn columns(self) -> &'static str {
        match self {
            Projection::LowRes => "componentName, label, icon_color, flags",
            Projection::HighRes => "componentName, label, icon_color, flags, icon, mono_icon",
        }
    }
}

fn row_to_stored_icon(row: &Row, projection: Projection) -> Result<StoredIcon> {
    let (icon, mono_icon) = match projection {
        Projection::LowRes => (None, None),
        Projection::HighRes => (row.get(4)?, row.get(5)?),
    };

    Ok(StoredIcon {
        component: row.get(0)?,
        label: row.get(1)?,
        icon_color: to_u32(row.get(2)?, COLUMN_ICON_COLOR)?,
        flags: to_u32(row.get(3)?, COLUMN_FLAGS)?,
        icon,
        mono_icon,
    })
}

/// The persistent tier: one SQLite table keyed by (component, profile serial).
pub struct IconDatabase {
    conn: Connection,
    path: PathBuf,
    schema_version: i32,
}

impl IconDatabase {
    /// Opens or creates the database. A stored schema version other than
    /// `schema_version` drops every row.
    pub fn open(path: &Path, schema_version: i32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create icon database directory {}", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open icon database {}", path.display()))?;

        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!("Failed to enable WAL mode: {err}");
        }

        ensure_schema(&mut conn, schema_version).context("failed to prepare icon schema")?;

        info!(
            "Icon database opened at {} (version {})",
            path.display(),
            schema_version
        );

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            schema_version,
        })
    }

    /// Opens an existing database for inspection without touching its schema.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open icon database {}", path.display()))?;
        let schema_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .context("failed to read user_version pragma")?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            schema_version,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn schema_version(&self) -> i32 {
        self.schema_version
    }

    pub fn query_entry(
        &self,
        component: &str,
        profile_serial: i64,
        projection: Projection,
    ) -> Result<Option<StoredIcon>> {
        let sql = format!(
            "SELECT {} FROM {TABLE_NAME} WHERE componentName = ?1 AND profileId = ?2",
            projection.columns()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params![component, profile_serial])?;

        match rows.next()? {
            Some(row) => row_to_stored_icon(row, projection)
                .with_context(|| format!("failed to read icon row for {component}"))
                .map(Some),
            None => Ok(None),
        }
    }

    /// Arbitrary read for inspection tooling. Column names must be table
    /// columns; `selection` is a raw SQL filter bound to `args`.
    pub fn query(
        &self,
        columns: &[&str],
        selection: Option<&str>,
        args: &[&dyn ToSql],
    ) -> Result<Vec<Vec<Value>>> {
        if let Some(unknown) = columns.iter().find(|column| !ALL_COLUMNS.contains(column)) {
            bail!("unknown icon column '{unknown}'");
        }

        let projection = if columns.is_empty() {
            ALL_COLUMNS.join(", ")
        } else {
            columns.join(", ")
        };
        let mut sql = format!("SELECT {projection} FROM {TABLE_NAME}");
        if let Some(selection) = selection {
            sql.push_str(" WHERE ");
            sql.push_str(selection);
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(args)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..column_count)
                .map(|idx| row.get::<_, Value>(idx))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            result.push(values);
        }

        Ok(result)
    }

    pub fn insert_or_replace(&self, row: &IconRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT OR REPLACE INTO icons (componentName, profileId, lastUpdated, version, icon, mono_icon, icon_color, flags, label, system_state, keywords)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?
            .execute(params![
                row.component,
                row.profile_serial,
                row.last_updated,
                row.version,
                row.icon,
                row.mono_icon,
                i64::from(row.icon_color),
                i64::from(row.flags),
                row.label,
                row.system_state,
                row.keywords,
            ])
            .with_context(|| format!("failed to write icon row for {}", row.component))?;
        Ok(())
    }

    pub fn delete(&self, selection: &str, args: &[&dyn ToSql]) -> Result<usize> {
        let sql = format!("DELETE FROM {TABLE_NAME} WHERE {selection}");
        self.conn
            .execute(&sql, args)
            .with_context(|| format!("failed to delete icon rows matching '{selection}'"))
    }

    pub fn delete_row(&self, component: &str, profile_serial: i64) -> Result<usize> {
        self.delete(
            "componentName = ?1 AND profileId = ?2",
            &[&component, &profile_serial],
        )
    }

    /// Deletes every row of `package` for one profile. The prefix comparison
    /// is exact and case-sensitive, matching the memory tier.
    pub fn delete_package(&self, package: &str, profile_serial: i64) -> Result<usize> {
        let prefix = format!("{package}/");
        let prefix_len = i64::try_from(prefix.chars().count())?;
        self.delete(
            "substr(componentName, 1, ?3) = ?1 AND profileId = ?2",
            &[&prefix, &profile_serial, &prefix_len],
        )
    }

    pub fn rows_for_profile(&self, profile_serial: i64) -> Result<Vec<RowFreshness>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT componentName, lastUpdated, version, system_state
             FROM icons
             WHERE profileId = ?1",
        )?;

        let rows = stmt
            .query_map(params![profile_serial], |row| {
                Ok(RowFreshness {
                    component: row.get(0)?,
                    last_updated: row.get(1)?,
                    version: row.get(2)?,
                    system_state: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn row_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM icons", [], |row| row.get(0))
            .optional()?
            .unwrap_or(0);
        u64::try_from(count).map_err(|_| anyhow!("negative row count {count}"))
    }

    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {TABLE_NAME}"), [])
            .context("failed to clear icon table")?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, err)| anyhow::Error::new(err).context("failed to close icon database"))
    }
}
