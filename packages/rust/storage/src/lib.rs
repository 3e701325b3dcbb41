//! libSQL storage for generated blueprint drafts.
//!
//! The [`Storage`] struct wraps a local libSQL database holding one row per
//! generation attempt. A row is created in `generating` state before the
//! provider is called and moves to `draft` exactly once, either with an
//! accepted blueprint or with a failure marker and excerpt.
//!
//! **Access rules:**
//! - CLI generation: read-write via [`Storage::open`]
//! - Review tooling: read-only via [`Storage::open_readonly`]
//!
//! There is deliberately no operation that promotes a draft into the live
//! service catalog.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use servicecraft_shared::{
    BlueprintId, BlueprintRecord, BlueprintStatus, DraftMarker, Result, ServiceCraftError,
    SourceKind,
};

/// Service code stored until a blueprint has been parsed.
pub const PENDING_SERVICE_CODE: &str = "pending";

/// Category stored until a blueprint has been parsed.
pub const DEFAULT_CATEGORY: &str = "strategic";

const SELECT_COLUMNS: &str = "id, practice_id, source_type, source_ref, status, service_code, \
     service_name, display_name, category, blueprint_json, error_marker, error_excerpt, \
     llm_model, prompt_hash, generation_tokens, generation_duration_ms, created_at, updated_at";

/// Provenance captured when a generation attempt starts.
#[derive(Debug, Clone)]
pub struct NewBlueprint<'a> {
    pub practice_id: &'a str,
    pub source_type: SourceKind,
    pub source_ref: Option<&'a str>,
    pub service_name: &'a str,
    pub llm_model: &'a str,
    pub prompt_hash: &'a str,
}

/// An accepted blueprint ready to be stored as a draft.
#[derive(Debug, Clone)]
pub struct DraftCompletion<'a> {
    pub service_code: &'a str,
    pub service_name: &'a str,
    pub display_name: &'a str,
    pub category: &'a str,
    pub document: &'a serde_json::Value,
    pub llm_model: &'a str,
    pub generation_tokens: u64,
    pub generation_duration_ms: u64,
}

/// A generation attempt that produced no usable blueprint.
#[derive(Debug, Clone)]
pub struct FailureRecord<'a> {
    pub marker: DraftMarker,
    /// Raw output excerpt or failure message shown to the reviewer.
    pub excerpt: &'a str,
    pub generation_tokens: Option<u64>,
    pub generation_duration_ms: Option<u64>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ServiceCraftError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ServiceCraftError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ServiceCraftError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ServiceCraftError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ServiceCraftError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ServiceCraftError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ServiceCraftError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Draft lifecycle
    // -----------------------------------------------------------------------

    /// Create the `generating` row for a new attempt. Returns its id.
    pub async fn insert_generating(&self, new: &NewBlueprint<'_>) -> Result<BlueprintId> {
        self.check_writable()?;
        let id = BlueprintId::new();
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO blueprints (id, practice_id, source_type, source_ref, status,
                    service_code, service_name, display_name, category, llm_model, prompt_hash,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    id.to_string(),
                    new.practice_id,
                    new.source_type.as_str(),
                    new.source_ref,
                    BlueprintStatus::Generating.as_str(),
                    PENDING_SERVICE_CODE,
                    new.service_name,
                    new.service_name,
                    DEFAULT_CATEGORY,
                    new.llm_model,
                    new.prompt_hash,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| ServiceCraftError::Storage(e.to_string()))?;

        tracing::debug!(blueprint_id = %id, practice_id = new.practice_id, "blueprint row created");
        Ok(id)
    }

    /// Store an accepted blueprint and move the row to `draft`.
    pub async fn complete_draft(&self, id: &BlueprintId, draft: &DraftCompletion<'_>) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let document = serde_json::to_string(draft.document)
            .map_err(|e| ServiceCraftError::Storage(format!("failed to encode blueprint: {e}")))?;

        let changed = self
            .conn
            .execute(
                "UPDATE blueprints SET status = ?1, service_code = ?2, service_name = ?3,
                    display_name = ?4, category = ?5, blueprint_json = ?6, error_marker = NULL,
                    error_excerpt = NULL, llm_model = ?7, generation_tokens = ?8,
                    generation_duration_ms = ?9, updated_at = ?10
                 WHERE id = ?11 AND status = ?12",
                params![
                    BlueprintStatus::Draft.as_str(),
                    draft.service_code,
                    draft.service_name,
                    draft.display_name,
                    draft.category,
                    document,
                    draft.llm_model,
                    draft.generation_tokens as i64,
                    draft.generation_duration_ms as i64,
                    now.as_str(),
                    id.to_string(),
                    BlueprintStatus::Generating.as_str(),
                ],
            )
            .await
            .map_err(|e| ServiceCraftError::Storage(e.to_string()))?;

        ensure_transitioned(id, changed)
    }

    /// Move the row to `draft` carrying a failure marker and excerpt.
    pub async fn record_failure(&self, id: &BlueprintId, failure: &FailureRecord<'_>) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let payload = serde_json::json!({
            "error": failure.marker.as_str(),
            "excerpt": failure.excerpt,
        })
        .to_string();

        let changed = self
            .conn
            .execute(
                "UPDATE blueprints SET status = ?1, blueprint_json = ?2, error_marker = ?3,
                    error_excerpt = ?4, generation_tokens = ?5, generation_duration_ms = ?6,
                    updated_at = ?7
                 WHERE id = ?8 AND status = ?9",
                params![
                    BlueprintStatus::Draft.as_str(),
                    payload,
                    failure.marker.as_str(),
                    failure.excerpt,
                    failure.generation_tokens.map(|t| t as i64),
                    failure.generation_duration_ms.map(|d| d as i64),
                    now.as_str(),
                    id.to_string(),
                    BlueprintStatus::Generating.as_str(),
                ],
            )
            .await
            .map_err(|e| ServiceCraftError::Storage(e.to_string()))?;

        ensure_transitioned(id, changed)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Get one blueprint by id.
    pub async fn get_blueprint(&self, id: &BlueprintId) -> Result<Option<BlueprintRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM blueprints WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(|e| ServiceCraftError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ServiceCraftError::Storage(e.to_string())),
        }
    }

    /// List blueprints, newest first, optionally for one practice.
    pub async fn list_blueprints(&self, practice_id: Option<&str>) -> Result<Vec<BlueprintRecord>> {
        let mut rows = match practice_id {
            Some(practice_id) => {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM blueprints WHERE practice_id = ?1
                     ORDER BY created_at DESC, id DESC"
                );
                self.conn.query(&sql, params![practice_id]).await
            }
            None => {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM blueprints ORDER BY created_at DESC, id DESC"
                );
                self.conn.query(&sql, params![]).await
            }
        }
        .map_err(|e| ServiceCraftError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }
}

/// A lifecycle update must hit exactly one `generating` row.
fn ensure_transitioned(id: &BlueprintId, changed: u64) -> Result<()> {
    if changed == 1 {
        Ok(())
    } else {
        Err(ServiceCraftError::Storage(format!(
            "blueprint {id} is not awaiting generation"
        )))
    }
}

fn storage_err(e: libsql::Error) -> ServiceCraftError {
    ServiceCraftError::Storage(e.to_string())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ServiceCraftError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`BlueprintRecord`].
fn row_to_record(row: &libsql::Row) -> Result<BlueprintRecord> {
    let source_type: String = row.get(2).map_err(storage_err)?;
    let status: String = row.get(4).map_err(storage_err)?;
    let blueprint_json: Option<String> = row.get::<String>(9).ok();
    let error_marker: Option<String> = row.get::<String>(10).ok();
    let created_at: String = row.get(16).map_err(storage_err)?;
    let updated_at: String = row.get(17).map_err(storage_err)?;

    let blueprint = match blueprint_json {
        Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
            ServiceCraftError::Storage(format!("corrupt blueprint_json: {e}"))
        })?),
        None => None,
    };

    Ok(BlueprintRecord {
        id: row.get::<String>(0).map_err(storage_err)?,
        practice_id: row.get::<String>(1).map_err(storage_err)?,
        source_type: SourceKind::parse(&source_type).ok_or_else(|| {
            ServiceCraftError::Storage(format!("unknown source_type '{source_type}'"))
        })?,
        source_ref: row.get::<String>(3).ok(),
        status: BlueprintStatus::parse(&status)
            .ok_or_else(|| ServiceCraftError::Storage(format!("unknown status '{status}'")))?,
        service_code: row.get::<String>(5).map_err(storage_err)?,
        service_name: row.get::<String>(6).map_err(storage_err)?,
        display_name: row.get::<String>(7).map_err(storage_err)?,
        category: row.get::<String>(8).map_err(storage_err)?,
        blueprint,
        error_marker: error_marker.as_deref().and_then(DraftMarker::parse),
        error_excerpt: row.get::<String>(11).ok(),
        llm_model: row.get::<String>(12).ok(),
        prompt_hash: row.get::<String>(13).ok(),
        generation_tokens: row.get::<i64>(14).ok().map(|v| v as u64),
        generation_duration_ms: row.get::<i64>(15).ok().map(|v| v as u64),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
