use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use iconcache::db::{pixel_size_from_version, IconDatabase, COLUMN_LAST_UPDATED, RELEASE_VERSION};
use rusqlite::{types::Value, ToSql};
use serde_json::{json, Map};

/// Dump rows of an icon cache database without modifying it.
#[derive(Debug, Parser)]
#[command(name = "iconcache-inspect")]
struct Args {
    /// Path to the icon cache database
    db: PathBuf,

    /// Columns to print, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    /// SQL filter, e.g. "profileId = ?1"
    #[arg(long = "where")]
    selection: Option<String>,

    /// Values bound to the filter's placeholders, in order
    #[arg(long = "arg")]
    args: Vec<String>,
}

fn to_json(column: &str, value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(int) if column == COLUMN_LAST_UPDATED => json!({
            "millis": int,
            "utc": DateTime::<Utc>::from_timestamp_millis(int).map(|dt| dt.to_rfc3339()),
        }),
        Value::Integer(int) => json!(int),
        Value::Real(real) => json!(real),
        Value::Text(text) => json!(text),
        Value::Blob(blob) => json!(format!("<{} bytes>", blob.len())),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let db = IconDatabase::open_read_only(&args.db)?;

    let version = db.schema_version();
    if version >> 16 != RELEASE_VERSION {
        log::warn!(
            "Database release {} differs from {}; the cache would discard it",
            version >> 16,
            RELEASE_VERSION
        );
    }
    log::info!(
        "{}: version {} (icon pixel size {})",
        db.path().display(),
        version,
        pixel_size_from_version(version)
    );

    let columns: Vec<&str> = if args.columns.is_empty() {
        iconcache::db::ALL_COLUMNS.to_vec()
    } else {
        args.columns.iter().map(String::as_str).collect()
    };
    let bound: Vec<&dyn ToSql> = args.args.iter().map(|arg| arg as &dyn ToSql).collect();

    let rows = db.query(&columns, args.selection.as_deref(), &bound)?;
    for row in &rows {
        let object: Map<String, serde_json::Value> = columns
            .iter()
            .zip(row.iter().cloned())
            .map(|(column, value)| (column.to_string(), to_json(column, value)))
            .collect();
        println!("{}", serde_json::Value::Object(object));
    }
    log::info!("{} rows", rows.len());

    Ok(())
}
