//! Database schema definitions
//!
//! This module contains the SQL schema for the response cache database.

/// SQL schema for the response cache
pub const SCHEMA_SQL: &str = r#"
-- One row per cached URL, keyed by sha256(url)
CREATE TABLE IF NOT EXISTS responses (
    url_hash TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    content TEXT NOT NULL,
    headers TEXT NOT NULL,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_responses_cached_at ON responses(cached_at);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
