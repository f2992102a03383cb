//! SQLite implementation of the model store.
//!
//! # Responsibility
//! - Persist one `ObjectRecord` per row of `model_objects`.
//! - Keep header fields relational and the kind payload as JSON.
//! - Allocate revision keys from the stored revisions of a kind.
//!
//! # Invariants
//! - The `kind` column always matches the body variant.
//! - Broken placeholders are never stored as rows; they live inline in
//!   the timestep body that references them.
//! - Template listings are ordered by id so positional comparison is stable.

use crate::db::migrations::ensure_model_schema;
use crate::model::object::ObjectKind;
use crate::model::revision::RevisionKey;
use crate::repo::model_store::{
    allocate_child_revision, ModelStore, ObjectRecord, RecordBody, StoreError, StoreResult,
    StoredSummary,
};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};

const RECORD_COLUMNS: &str = "id,
    kind,
    parent_id,
    is_template,
    revision,
    short_name,
    description,
    author,
    created_at,
    modified_at,
    locked,
    display_position,
    body_json";

/// SQLite-backed model store.
pub struct SqliteModelStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteModelStore<'conn> {
    /// Creates store from migrated connection.
    ///
    /// # Errors
    /// - `StoreError::Db` wrapping `DbError::SchemaBehind` or
    ///   `DbError::MissingTable` when `conn` was not opened through `open_db`.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_model_schema(conn)?;
        Ok(Self { conn })
    }
}

impl ModelStore for SqliteModelStore<'_> {
    fn load(&self, kind: ObjectKind, id: i64) -> StoreResult<Option<ObjectRecord>> {
        let sql =
            format!("SELECT {RECORD_COLUMNS} FROM model_objects WHERE id = ?1 AND kind = ?2;");
        self.conn
            .query_row(&sql, params![id, kind.as_str()], parse_record_row)
            .optional()?
            .transpose()
    }

    fn save(&mut self, record: &ObjectRecord) -> StoreResult<i64> {
        let kind = record.kind();
        let body_json = serde_json::to_string(&record.body)?;

        if record.id < 0 {
            return Err(StoreError::Rejected(format!(
                "broken {} placeholder cannot be saved",
                kind.as_str()
            )));
        }

        if record.id == 0 {
            self.conn.execute(
                "INSERT INTO model_objects (
                    kind,
                    parent_id,
                    is_template,
                    revision,
                    short_name,
                    description,
                    author,
                    created_at,
                    modified_at,
                    locked,
                    display_position,
                    body_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
                params![
                    kind.as_str(),
                    record.parent_id,
                    record.is_template,
                    record.revision.to_string(),
                    record.short_name,
                    record.description,
                    record.author,
                    record.created_at,
                    record.modified_at,
                    record.locked,
                    record.display_position,
                    body_json,
                ],
            )?;
            let id = self.conn.last_insert_rowid();
            debug!(
                "event=store_save module=repo status=ok kind={} id={} mode=insert",
                kind.as_str(),
                id
            );
            return Ok(id);
        }

        let changed = self.conn.execute(
            "UPDATE model_objects
             SET parent_id = ?3,
                 is_template = ?4,
                 revision = ?5,
                 short_name = ?6,
                 description = ?7,
                 author = ?8,
                 created_at = ?9,
                 modified_at = ?10,
                 locked = ?11,
                 display_position = ?12,
                 body_json = ?13
             WHERE id = ?1 AND kind = ?2;",
            params![
                record.id,
                kind.as_str(),
                record.parent_id,
                record.is_template,
                record.revision.to_string(),
                record.short_name,
                record.description,
                record.author,
                record.created_at,
                record.modified_at,
                record.locked,
                record.display_position,
                body_json,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind,
                id: record.id,
            });
        }
        debug!(
            "event=store_save module=repo status=ok kind={} id={} mode=update",
            kind.as_str(),
            record.id
        );
        Ok(record.id)
    }

    fn delete(&mut self, kind: ObjectKind, id: i64) -> StoreResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM model_objects WHERE id = ?1 AND kind = ?2;",
            params![id, kind.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind, id });
        }
        Ok(())
    }

    fn next_revision(&self, kind: ObjectKind, current: &str) -> StoreResult<String> {
        let current = RevisionKey::parse(current)?;
        let mut stmt = self
            .conn
            .prepare("SELECT revision FROM model_objects WHERE kind = ?1;")?;
        let mut rows = stmt.query([kind.as_str()])?;
        let mut used = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            used.push(RevisionKey::parse(&text)?);
        }
        Ok(allocate_child_revision(&current, &used).to_string())
    }

    fn load_templates(
        &self,
        kind: ObjectKind,
        exclude_id: Option<i64>,
    ) -> StoreResult<Vec<ObjectRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM model_objects
             WHERE kind = ?1
               AND is_template = 1
               AND id != ?2
             ORDER BY id ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![kind.as_str(), exclude_id.unwrap_or(0)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)??);
        }
        Ok(records)
    }

    fn list_other(&self, kind: ObjectKind, exclude_id: i64) -> StoreResult<Vec<StoredSummary>> {
        self.list_summaries(
            "SELECT id, short_name, revision
             FROM model_objects
             WHERE kind = ?1 AND id != ?2
             ORDER BY short_name ASC, id ASC;",
            params![kind.as_str(), exclude_id],
        )
    }

    fn list_orphans(&self, kind: ObjectKind) -> StoreResult<Vec<StoredSummary>> {
        self.list_summaries(
            "SELECT id, short_name, revision
             FROM model_objects
             WHERE kind = ?1 AND is_template = 0 AND parent_id IS NULL
             ORDER BY short_name ASC, id ASC;",
            params![kind.as_str()],
        )
    }
}

impl SqliteModelStore<'_> {
    fn list_summaries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<StoredSummary>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let revision: String = row.get(2)?;
            items.push(StoredSummary {
                id: row.get(0)?,
                short_name: row.get(1)?,
                revision: RevisionKey::parse(&revision)?,
            });
        }
        Ok(items)
    }
}

fn parse_record_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<ObjectRecord>> {
    let id: i64 = row.get(0)?;
    let kind_text: String = row.get(1)?;
    let revision_text: String = row.get(4)?;
    let body_json: String = row.get(12)?;

    let header = (
        row.get::<_, Option<i64>>(2)?,
        row.get::<_, bool>(3)?,
        row.get::<_, String>(5)?,
        row.get::<_, String>(6)?,
        row.get::<_, String>(7)?,
        row.get::<_, i64>(8)?,
        row.get::<_, i64>(9)?,
        row.get::<_, bool>(10)?,
        row.get::<_, i32>(11)?,
    );

    Ok(build_record(id, &kind_text, &revision_text, &body_json, header))
}

type HeaderColumns = (
    Option<i64>,
    bool,
    String,
    String,
    String,
    i64,
    i64,
    bool,
    i32,
);

fn build_record(
    id: i64,
    kind_text: &str,
    revision_text: &str,
    body_json: &str,
    header: HeaderColumns,
) -> StoreResult<ObjectRecord> {
    let kind = ObjectKind::parse(kind_text).ok_or_else(|| {
        StoreError::InvalidData(format!("unknown kind `{kind_text}` for id {id}"))
    })?;
    let body: RecordBody = serde_json::from_str(body_json)?;
    if body.kind() != kind {
        return Err(StoreError::InvalidData(format!(
            "row {id} has kind `{}` but a `{}` body",
            kind.as_str(),
            body.kind().as_str()
        )));
    }
    let revision = RevisionKey::parse(revision_text)?;

    let (
        parent_id,
        is_template,
        short_name,
        description,
        author,
        created_at,
        modified_at,
        locked,
        display_position,
    ) = header;
    Ok(ObjectRecord {
        id,
        parent_id,
        is_template,
        revision,
        short_name,
        description,
        author,
        created_at,
        modified_at,
        locked,
        display_position,
        body,
    })
}
