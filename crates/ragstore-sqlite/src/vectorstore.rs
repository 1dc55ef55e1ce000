use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ragstore_config::{SqliteSettings, VectorStoreConfig};
use ragstore_core::similarity::{cosine_with_norm, l2_norm, COSINE};
use ragstore_core::text::{keyword_score, query_terms};
use ragstore_core::{
    Result, RetrievalError, SearchOptions, SimilarityCalculator, SimilarityMetric, StoreStats,
    VectorRecord, VectorSearchResult, VectorStore,
};
use rayon::prelude::*;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::codec::{blob_to_embed, embed_to_blob};
use crate::query::WhereClause;
use crate::retry::{sqlite_error, RetryPolicy};
use crate::schema::{self, validate_identifier};

/// Candidates scored per rayon task.
const SCORE_CHUNK: usize = 256;
/// Ids per `IN (...)` list when soft-deleting.
const DELETE_CHUNK: usize = 500;

/// SQLite-backed [`VectorStore`].
///
/// Embeddings are stored as little-endian f32 BLOBs next to their L2 norm,
/// and scored in Rust across rayon workers. Rows are soft-deleted and purged
/// by [`optimize`](VectorStore::optimize). Every database call goes through a
/// [`RetryPolicy`], so lock contention from other processes surfaces as
/// [`RetrievalError::Busy`] only after the retries are spent.
pub struct SqliteVectorStore {
    settings: SqliteSettings,
    metric: String,
    prefilter_limit: Option<usize>,
    batch_size: usize,
    calculator: Arc<SimilarityCalculator>,
    conn: Arc<Mutex<Option<Connection>>>,
    dimension: Mutex<Option<usize>>,
    retry: RetryPolicy,
    last_maintenance: Mutex<Option<Instant>>,
}

/// A candidate row as read from the table, before decoding.
struct RawRow {
    id: String,
    content: String,
    embedding: Vec<u8>,
    metadata: Option<String>,
    norm: Option<f64>,
}

/// A record encoded for the upsert statement.
struct EncodedRow {
    id: String,
    content: String,
    blob: Vec<u8>,
    metadata: String,
    dimension: i64,
    norm: f64,
    content_hash: String,
}

impl SqliteVectorStore {
    /// Build an engine from a config with `sqlite` settings. Nothing is opened
    /// until [`initialize`](VectorStore::initialize).
    pub fn new(config: &VectorStoreConfig, calculator: Arc<SimilarityCalculator>) -> Result<Self> {
        let settings = config
            .sqlite
            .clone()
            .ok_or_else(|| RetrievalError::Config("sqlite settings missing".to_string()))?;
        validate_identifier("table name", &settings.table_name)?;
        if settings.index_optimization.enable_btree_index {
            validate_identifier(
                "metadata index field",
                &settings.index_optimization.metadata_index_field,
            )?;
        }
        calculator.metric(&config.similarity_metric)?;

        let q = &config.query_optimization;
        Ok(Self {
            settings,
            metric: config.similarity_metric.clone(),
            prefilter_limit: q.enable_prefiltering.then_some(q.max_candidates),
            batch_size: config.batch_size.max(1),
            calculator,
            conn: Arc::new(Mutex::new(None)),
            dimension: Mutex::new(config.dimension),
            retry: RetryPolicy::default(),
            last_maintenance: Mutex::new(None),
        })
    }

    /// Replace the retry policy used for busy/locked failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Table holding the vectors.
    pub fn table_name(&self) -> &str {
        &self.settings.table_name
    }

    /// Database file path, or `:memory:`.
    pub fn path(&self) -> &str {
        &self.settings.path
    }

    pub fn is_open(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn current_dimension(&self) -> Option<usize> {
        *self.dimension.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dimension the batch must have: the store's, or the batch's own while the store is empty.
    fn check_dimension(&self, records: &[VectorRecord]) -> Result<usize> {
        let expected = match self.current_dimension() {
            Some(d) => d,
            None => records.first().map(VectorRecord::dimension).unwrap_or(0),
        };
        if let Some(bad) = records.iter().find(|r| r.dimension() != expected) {
            return Err(RetrievalError::DimensionMismatch {
                expected,
                actual: bad.dimension(),
            });
        }
        Ok(expected)
    }

    /// Record the dimension once rows of that length are committed.
    fn establish_dimension(&self, committed: usize) {
        let mut dimension = self.dimension.lock().unwrap_or_else(PoisonError::into_inner);
        if dimension.is_none() {
            debug!(table = %self.settings.table_name, dimension = committed, "store dimension established");
            *dimension = Some(committed);
        }
    }

    /// Run `f` against the open connection on the blocking pool, with retries.
    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&mut Connection) -> Result<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.retry
            .run(operation, || {
                let conn = self.conn.clone();
                let f = f.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        let mut guard = conn.lock().map_err(|_| {
                            RetrievalError::Storage("connection mutex poisoned".to_string())
                        })?;
                        let conn = guard.as_mut().ok_or_else(|| {
                            RetrievalError::Storage("store is not initialized".to_string())
                        })?;
                        f(conn)
                    })
                    .await
                    .map_err(|e| RetrievalError::Storage(format!("spawn_blocking error: {e}")))?
                }
            })
            .await
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn initialize(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let settings = self.settings.clone();
        let (conn, stored) = self
            .retry
            .run("initialize", || {
                let settings = settings.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        let conn = schema::open(&settings)?;
                        schema::create_schema(&conn, &settings)?;
                        let stored = schema::stored_dimension(&conn, &settings.table_name)?;
                        Ok::<_, RetrievalError>((conn, stored))
                    })
                    .await
                    .map_err(|e| RetrievalError::Storage(format!("spawn_blocking error: {e}")))?
                }
            })
            .await?;

        {
            let mut dimension = self.dimension.lock().unwrap_or_else(PoisonError::into_inner);
            match (*dimension, stored) {
                (Some(expected), Some(actual)) if expected != actual => {
                    return Err(RetrievalError::Config(format!(
                        "table {} holds {actual}-dimensional vectors, expected {expected}",
                        self.settings.table_name
                    )));
                }
                (None, Some(actual)) => *dimension = Some(actual),
                _ => {}
            }
        }

        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(conn);
            info!(
                path = %self.settings.path,
                table = %self.settings.table_name,
                dimension = ?self.current_dimension(),
                "SQLite vector store opened"
            );
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<VectorSearchResult>> {
        let Some(dimension) = self.current_dimension() else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        let metric = self.calculator.metric(&self.metric)?;
        let direction = metric.direction();

        let clause = WhereClause::new(
            "dimension = ? AND is_deleted = 0",
            vec![SqlValue::Integer(dimension as i64)],
        )
        .with_options(options)?;
        let limit = self
            .prefilter_limit
            .map(|n| format!(" LIMIT {n}"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT id, content, embedding, metadata, norm FROM {} WHERE {} \
             ORDER BY created_at DESC, rowid DESC{limit}",
            self.settings.table_name, clause.sql
        );
        let params = clause.params;
        let rows = self
            .blocking("search", move |conn| load_candidates(conn, &sql, &params))
            .await?;
        let candidates = rows.len();

        let query_vec = query.to_vec();
        let use_norm = self.metric == COSINE;
        let (rows, scores) = tokio::task::spawn_blocking(move || {
            let scores = score_rows(&rows, &query_vec, dimension, metric.as_ref(), use_norm)?;
            Ok::<_, RetrievalError>((rows, scores))
        })
        .await
        .map_err(|e| RetrievalError::Storage(format!("spawn_blocking error: {e}")))??;

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
        direction.sort(&mut ranked, |(_, score)| *score);
        if let Some(t) = options.threshold {
            ranked.retain(|(_, score)| direction.passes(*score, t));
        }
        ranked.truncate(options.top_k_or_default());
        debug!(
            table = %self.settings.table_name,
            candidates,
            returned = ranked.len(),
            "sqlite search"
        );

        let mut rows: Vec<Option<RawRow>> = rows.into_iter().map(Some).collect();
        ranked
            .into_iter()
            .filter_map(|(i, score)| rows[i].take().map(|row| (row, score)))
            .map(|(row, score)| -> Result<VectorSearchResult> {
                let embedding = if options.include_embeddings {
                    Some(blob_to_embed(&row.embedding, dimension)?)
                } else {
                    None
                };
                Ok(VectorSearchResult {
                    metadata: parse_metadata(&row.id, row.metadata.as_deref())?,
                    id: row.id,
                    content: row.content,
                    score,
                    embedding,
                })
            })
            .collect()
    }

    async fn add_vectors(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let dimension = self.check_dimension(&records)?;
        let total = records.len();

        let mut encoded = Vec::with_capacity(total);
        for record in records {
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|e| RetrievalError::Storage(format!("JSON serialize error: {e}")))?;
            encoded.push(EncodedRow {
                blob: embed_to_blob(&record.embedding),
                norm: f64::from(l2_norm(&record.embedding)),
                content_hash: record.content_hash(),
                dimension: dimension as i64,
                metadata,
                id: record.id,
                content: record.content,
            });
        }

        let mut rows = encoded.into_iter().peekable();
        while rows.peek().is_some() {
            let group: Vec<EncodedRow> = rows.by_ref().take(self.batch_size).collect();
            let table = self.settings.table_name.clone();
            self.blocking("add_vectors", move |conn| upsert_group(conn, &table, &group))
                .await?;
            self.establish_dimension(dimension);
        }
        debug!(table = %self.settings.table_name, count = total, "upserted vectors");
        Ok(())
    }

    async fn remove_vectors(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let table = self.settings.table_name.clone();
        let ids = ids.to_vec();
        let removed = self
            .blocking("remove_vectors", move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| sqlite_error("SQLite transaction error", e))?;
                let mut removed = 0;
                for chunk in ids.chunks(DELETE_CHUNK) {
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    removed += tx
                        .execute(
                            &format!(
                                "UPDATE {table} SET is_deleted = 1 \
                                 WHERE is_deleted = 0 AND id IN ({placeholders})"
                            ),
                            params_from_iter(chunk.iter()),
                        )
                        .map_err(|e| sqlite_error("SQLite delete error", e))?;
                }
                tx.commit()
                    .map_err(|e| sqlite_error("SQLite commit error", e))?;
                Ok(removed)
            })
            .await?;
        debug!(table = %self.settings.table_name, removed, "soft-deleted vectors");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let table = self.settings.table_name.clone();
        self.blocking("clear", move |conn| {
            conn.execute(&format!("DELETE FROM {table}"), [])
                .map_err(|e| sqlite_error("SQLite clear error", e))
        })
        .await?;
        info!(table = %self.settings.table_name, "cleared vector store");
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let table = self.settings.table_name.clone();
        let (total, size) = self
            .blocking("stats", move |conn| {
                let total: i64 = conn
                    .query_row(
                        &format!("SELECT COUNT(*) FROM {table} WHERE is_deleted = 0"),
                        [],
                        |row| row.get(0),
                    )
                    .map_err(|e| sqlite_error("SQLite count error", e))?;
                let size: i64 = conn
                    .query_row(
                        "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                        [],
                        |row| row.get(0),
                    )
                    .map_err(|e| sqlite_error("SQLite page size error", e))?;
                Ok((total, size))
            })
            .await?;
        Ok(StoreStats {
            total_vectors: total.max(0) as usize,
            dimension: self.current_dimension().unwrap_or(0),
            index_size: size.max(0) as u64,
        })
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.current_dimension())
    }

    async fn get_vector(&self, id: &str) -> Result<Option<VectorRecord>> {
        let table = self.settings.table_name.clone();
        let key = id.to_string();
        let row = self
            .blocking("get_vector", move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT content, embedding, metadata, dimension FROM {table} \
                         WHERE id = ?1 AND is_deleted = 0"
                    ),
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Vec<u8>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| sqlite_error("SQLite query error", e))
            })
            .await?;

        let Some((content, blob, metadata, dimension)) = row else {
            return Ok(None);
        };
        Ok(Some(VectorRecord {
            embedding: blob_to_embed(&blob, dimension.max(0) as usize)?,
            metadata: parse_metadata(id, metadata.as_deref())?,
            id: id.to_string(),
            content,
        }))
    }

    async fn text_search(&self, query: &str, options: &SearchOptions) -> Result<Vec<VectorSearchResult>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let clause = WhereClause::new("is_deleted = 0", Vec::new()).with_options(options)?;
        let sql = format!(
            "SELECT id, content, embedding, metadata, dimension FROM {} WHERE {} \
             ORDER BY created_at DESC, rowid DESC",
            self.settings.table_name, clause.sql
        );
        let params = clause.params;
        let rows = self
            .blocking("text_search", move |conn| {
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|e| sqlite_error("SQLite prepare error", e))?;
                let rows = stmt
                    .query_map(params_from_iter(params.iter()), |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    })
                    .map_err(|e| sqlite_error("SQLite query error", e))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(|e| sqlite_error("SQLite read error", e))
            })
            .await?;

        let mut scored: Vec<_> = rows
            .into_iter()
            .map(|row| {
                let score = keyword_score(&terms, &row.1);
                (row, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(options.top_k_or_default());

        scored
            .into_iter()
            .map(|((id, content, blob, metadata, dimension), score)| -> Result<VectorSearchResult> {
                let embedding = if options.include_embeddings {
                    Some(blob_to_embed(&blob, dimension.max(0) as usize)?)
                } else {
                    None
                };
                Ok(VectorSearchResult {
                    metadata: parse_metadata(&id, metadata.as_deref())?,
                    id,
                    content,
                    score,
                    embedding,
                })
            })
            .collect()
    }

    /// Purge soft-deleted rows, then `VACUUM` and `ANALYZE`, at most once per
    /// `vacuum_interval_hours`.
    async fn optimize(&self) -> Result<bool> {
        let interval = Duration::from_secs(
            self.settings
                .index_optimization
                .vacuum_interval_hours
                .saturating_mul(3600),
        );
        let last = *self
            .last_maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(at) = last {
            if at.elapsed() < interval {
                debug!(table = %self.settings.table_name, "maintenance skipped, ran recently");
                return Ok(false);
            }
        }

        let table = self.settings.table_name.clone();
        let purged = self
            .blocking("optimize", move |conn| {
                let purged = conn
                    .execute(&format!("DELETE FROM {table} WHERE is_deleted = 1"), [])
                    .map_err(|e| sqlite_error("SQLite purge error", e))?;
                conn.execute_batch("VACUUM; ANALYZE;")
                    .map_err(|e| sqlite_error("SQLite vacuum error", e))?;
                Ok(purged)
            })
            .await?;

        *self
            .last_maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        info!(table = %self.settings.table_name, purged, "SQLite maintenance complete");
        Ok(true)
    }

    async fn compact(&self) -> Result<()> {
        self.blocking("compact", |conn| {
            conn.execute_batch("PRAGMA shrink_memory;")
                .map_err(|e| sqlite_error("SQLite shrink_memory error", e))
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = conn {
            conn.close()
                .map_err(|(_, e)| sqlite_error("SQLite close error", e))?;
            info!(path = %self.settings.path, table = %self.settings.table_name, "SQLite vector store closed");
        }
        Ok(())
    }
}

fn load_candidates(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<Vec<RawRow>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| sqlite_error("SQLite prepare error", e))?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(RawRow {
                id: row.get(0)?,
                content: row.get(1)?,
                embedding: row.get(2)?,
                metadata: row.get(3)?,
                norm: row.get(4)?,
            })
        })
        .map_err(|e| sqlite_error("SQLite query error", e))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| sqlite_error("SQLite read error", e))
}

/// Decode and score every row, in row order.
fn score_rows(
    rows: &[RawRow],
    query: &[f32],
    dimension: usize,
    metric: &dyn SimilarityMetric,
    use_norm: bool,
) -> Result<Vec<f32>> {
    let query_norm = l2_norm(query);
    let chunks: Vec<Vec<f32>> = rows
        .par_chunks(SCORE_CHUNK)
        .map(|chunk| {
            chunk
                .iter()
                .map(|row| -> Result<f32> {
                    let embedding = blob_to_embed(&row.embedding, dimension)?;
                    Ok(match row.norm {
                        Some(norm) if use_norm => {
                            cosine_with_norm(query, query_norm, &embedding, norm as f32)
                        }
                        _ => metric.calculate(query, &embedding),
                    })
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(chunks.into_iter().flatten().collect())
}

/// Upsert one group of rows in a single transaction.
fn upsert_group(conn: &mut Connection, table: &str, rows: &[EncodedRow]) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| sqlite_error("SQLite transaction error", e))?;
    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {table} (id, content, embedding, metadata, dimension, norm, content_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    embedding = excluded.embedding,
                    metadata = excluded.metadata,
                    dimension = excluded.dimension,
                    norm = excluded.norm,
                    content_hash = excluded.content_hash,
                    is_deleted = 0"
            ))
            .map_err(|e| sqlite_error("SQLite prepare error", e))?;
        for row in rows {
            stmt.execute(params![
                row.id,
                row.content,
                row.blob,
                row.metadata,
                row.dimension,
                row.norm,
                row.content_hash,
            ])
            .map_err(|e| sqlite_error("SQLite insert error", e))?;
        }
    }
    tx.commit()
        .map_err(|e| sqlite_error("SQLite commit error", e))
}

fn parse_metadata(id: &str, raw: Option<&str>) -> Result<HashMap<String, Value>> {
    match raw {
        None | Some("") => Ok(HashMap::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| RetrievalError::Corrupt(format!("metadata of {id} is not a JSON object: {e}"))),
    }
}
