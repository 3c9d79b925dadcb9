//! Table layout of a project store file.

use crate::ports::StoreError;

/// Bumped whenever the layout below changes.
pub const SCHEMA_VERSION: &str = "1";

pub const RUN_IDS_TABLE: &str = "runids";
pub const STATUS_TABLE: &str = "status";
pub const VERSION_TABLE: &str = "version";
pub const PROJECT_ID_TABLE: &str = "projectid";

const MAX_TABLE_NAME_LEN: usize = 64;

/// Fixed tables, created on every open.
pub const BOOTSTRAP: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS runids (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        runid TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS status (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        runid INTEGER NOT NULL REFERENCES runids(id) ON DELETE CASCADE,
        series TEXT NOT NULL,
        json TEXT NOT NULL,
        UNIQUE (runid, series)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS version (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        version TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS projectid (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        projectid TEXT NOT NULL
    )
    "#,
];

/// Checks that `name` can be used as an event or blob table.
///
/// Names are quoted when spliced into SQL, so the check only has to keep
/// quote and control characters out and stop writes into the fixed tables.
pub fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let reserved = [RUN_IDS_TABLE, STATUS_TABLE, VERSION_TABLE, PROJECT_ID_TABLE];
    // SQLite identifiers are case-insensitive.
    let lower = name.to_ascii_lowercase();
    let well_formed = !name.is_empty()
        && name.len() <= MAX_TABLE_NAME_LEN
        && !name.chars().any(|c| c == '"' || c.is_control())
        && !lower.starts_with("sqlite_");

    if !well_formed || reserved.contains(&lower.as_str()) {
        return Err(StoreError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

/// Double-quoted identifier. Only call with validated names.
pub fn quoted(name: &str) -> String {
    format!("\"{}\"", name)
}

pub fn create_event_table(table: &str) -> [String; 2] {
    [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                series TEXT,
                runid INTEGER REFERENCES runids(id) ON DELETE CASCADE,
                json TEXT NOT NULL
            )
            "#,
            t = quoted(table)
        ),
        series_index(table),
    ]
}

pub fn create_blob_table(table: &str) -> [String; 2] {
    [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                series TEXT,
                runid INTEGER REFERENCES runids(id) ON DELETE CASCADE,
                metadata TEXT NOT NULL,
                data BLOB NOT NULL
            )
            "#,
            t = quoted(table)
        ),
        series_index(table),
    ]
}

fn series_index(table: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {idx} ON {t} (series, runid)",
        idx = quoted(&format!("idx_{}_series_runid", table)),
        t = quoted(table)
    )
}
