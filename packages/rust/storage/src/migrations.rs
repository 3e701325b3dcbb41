//! SQL migration definitions for the ServiceCraft draft database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: blueprints",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Generated service blueprints awaiting human review
CREATE TABLE IF NOT EXISTS blueprints (
    id                     TEXT PRIMARY KEY,
    practice_id            TEXT NOT NULL,
    source_type            TEXT NOT NULL CHECK (source_type IN ('concept', 'opportunity', 'manual')),
    source_ref             TEXT,
    status                 TEXT NOT NULL CHECK (status IN ('generating', 'draft')),
    service_code           TEXT NOT NULL DEFAULT 'pending',
    service_name           TEXT NOT NULL,
    display_name           TEXT NOT NULL,
    category               TEXT NOT NULL DEFAULT 'strategic',
    blueprint_json         TEXT,
    error_marker           TEXT CHECK (error_marker IS NULL OR error_marker IN ('parse_error', 'provider_unavailable')),
    error_excerpt          TEXT,
    llm_model              TEXT,
    prompt_hash            TEXT,
    generation_tokens      INTEGER,
    generation_duration_ms INTEGER,
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blueprints_practice ON blueprints(practice_id, created_at);
CREATE INDEX IF NOT EXISTS idx_blueprints_source ON blueprints(source_type, source_ref);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
