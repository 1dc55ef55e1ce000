use std::path::Path;
use std::time::Duration;

use ragstore_config::{JournalMode, SqliteSettings, IN_MEMORY};
use ragstore_core::{Result, RetrievalError};
use regex::Regex;
use rusqlite::Connection;
use tracing::debug;

use crate::retry::sqlite_error;

/// Table names and the indexed metadata field are spliced into SQL, so they
/// must be plain identifiers.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")
        .map_err(|e| RetrievalError::Config(format!("invalid regex: {e}")))?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(RetrievalError::Config(format!(
            "invalid {kind} {name:?}: expected letters, digits and underscores"
        )))
    }
}

pub(crate) fn open(settings: &SqliteSettings) -> Result<Connection> {
    let conn = if settings.path == IN_MEMORY {
        Connection::open_in_memory()
    } else {
        if let Some(parent) = Path::new(&settings.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RetrievalError::Storage(format!(
                        "cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        Connection::open(&settings.path)
    }
    .map_err(|e| sqlite_error("SQLite open error", e))?;

    apply_pragmas(&conn, settings)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, settings: &SqliteSettings) -> Result<()> {
    let pragma = &settings.pragma_settings;
    conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))
        .map_err(|e| sqlite_error("SQLite busy_timeout error", e))?;

    let journal = match pragma.journal_mode {
        JournalMode::Wal if !settings.enable_wal => JournalMode::Delete,
        mode => mode,
    };
    let applied: String = conn
        .pragma_update_and_check(None, "journal_mode", journal.as_sql(), |row| row.get(0))
        .map_err(|e| sqlite_error("SQLite journal_mode error", e))?;

    conn.pragma_update(None, "synchronous", pragma.synchronous.as_sql())
        .map_err(|e| sqlite_error("SQLite synchronous error", e))?;
    conn.pragma_update(None, "cache_size", pragma.cache_size)
        .map_err(|e| sqlite_error("SQLite cache_size error", e))?;
    conn.pragma_update(None, "temp_store", pragma.temp_store.as_sql())
        .map_err(|e| sqlite_error("SQLite temp_store error", e))?;

    debug!(
        path = %settings.path,
        journal_mode = %applied,
        synchronous = pragma.synchronous.as_sql(),
        cache_size = pragma.cache_size,
        "applied SQLite pragmas"
    );
    Ok(())
}

/// Create the table, its timestamp trigger and its partial indexes.
pub(crate) fn create_schema(conn: &Connection, settings: &SqliteSettings) -> Result<()> {
    let t = &settings.table_name;
    let index = &settings.index_optimization;

    let mut ddl = format!(
        "CREATE TABLE IF NOT EXISTS {t} (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT DEFAULT '{{}}',
            dimension INTEGER NOT NULL,
            norm REAL,
            content_hash TEXT,
            created_at INTEGER DEFAULT (strftime('%s', 'now')),
            updated_at INTEGER DEFAULT (strftime('%s', 'now')),
            is_deleted INTEGER DEFAULT 0
        );
        CREATE TRIGGER IF NOT EXISTS {t}_update_timestamp
        AFTER UPDATE ON {t}
        BEGIN
            UPDATE {t} SET updated_at = strftime('%s', 'now') WHERE id = NEW.id;
        END;
        CREATE INDEX IF NOT EXISTS idx_{t}_dimension ON {t}(dimension) WHERE is_deleted = 0;
        CREATE INDEX IF NOT EXISTS idx_{t}_content_hash ON {t}(content_hash) WHERE is_deleted = 0;
        CREATE INDEX IF NOT EXISTS idx_{t}_created_at ON {t}(created_at) WHERE is_deleted = 0;"
    );
    if index.enable_btree_index {
        let field = &index.metadata_index_field;
        ddl.push_str(&format!(
            "\nCREATE INDEX IF NOT EXISTS idx_{t}_metadata
             ON {t}(json_extract(metadata, '$.{field}')) WHERE is_deleted = 0;"
        ));
    }
    if index.enable_hash_index {
        debug!(table = %t, "SQLite has no hash indexes; enable_hash_index ignored");
    }

    conn.execute_batch(&ddl)
        .map_err(|e| sqlite_error("SQLite create table error", e))
}

/// Dimension of any row already in the table.
pub(crate) fn stored_dimension(conn: &Connection, table: &str) -> Result<Option<usize>> {
    let mut stmt = conn
        .prepare(&format!("SELECT dimension FROM {table} LIMIT 1"))
        .map_err(|e| sqlite_error("SQLite prepare error", e))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| sqlite_error("SQLite query error", e))?;
    match rows.next().map_err(|e| sqlite_error("SQLite query error", e))? {
        Some(row) => {
            let d: i64 = row.get(0).map_err(|e| sqlite_error("SQLite read error", e))?;
            Ok(Some(d as usize))
        }
        None => Ok(None),
    }
}
