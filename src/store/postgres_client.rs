use super::schema::KnowledgeSchema;
use super::{parse_vector_literal, vector_literal, DocumentStore, StoreQuery};
use crate::config::DatabaseConfig;
use crate::error::{RouterError, RouterResult};
use crate::types::{Corpus, KnowledgeRecord, ResultMetadata, ScoredRecord, SearchFilters};
use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use std::time::Duration;
use tokio::time::timeout;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info, warn};

/// Postgres store with pgvector and tsvector support
pub struct PostgresStore {
    /// Connection pool for Postgres
    pool: Pool,
    statement_timeout: Duration,
}

/// Column projection shared by every read, per corpus
fn projection(corpus: Corpus, include_embeddings: bool) -> String {
    let base = match corpus {
        Corpus::Faq => {
            "'faq:' || faq_key AS identity, question AS title, answer AS content, \
             metadata::text AS metadata, NULL::text AS document_id, NULL::integer AS chunk_index"
        }
        Corpus::Document => {
            "'doc:' || document_id || ':chunk:' || chunk_index AS identity, title, content, \
             metadata::text AS metadata, document_id, chunk_index"
        }
    };
    if include_embeddings {
        format!("{}, embedding::text AS embedding", base)
    } else {
        format!("{}, NULL::text AS embedding", base)
    }
}

fn content_column(corpus: Corpus) -> &'static str {
    match corpus {
        Corpus::Faq => "answer",
        Corpus::Document => "content",
    }
}

fn filter_param(filters: Option<&SearchFilters>) -> Option<String> {
    filters
        .filter(|f| !f.is_empty())
        .map(|f| f.to_containment_json().to_string())
}

impl PostgresStore {
    /// Create a new store with connection pooling
    pub async fn new(config: &DatabaseConfig) -> RouterResult<Self> {
        let url = config
            .url
            .as_ref()
            .ok_or_else(|| RouterError::ConfigError("DATABASE_URL is required".to_string()))?;

        info!("Initializing Postgres store with URL: {}", sanitize_url_for_logging(url));

        if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
            return Err(RouterError::DatabaseError(
                "Invalid database URL format".to_string(),
            ));
        }

        let mut pg_config = Config::new();
        pg_config.url = Some(url.clone());
        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(config.max_connections));

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| RouterError::DatabaseError(format!("Failed to create connection pool: {}", e)))?;

        let store = PostgresStore {
            pool,
            statement_timeout: Duration::from_millis(config.statement_timeout_ms),
        };
        store.health_check().await?;

        info!("Postgres store connected successfully");
        Ok(store)
    }

    async fn client(&self) -> RouterResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| RouterError::DatabaseError(format!("Failed to get connection: {}", e)))
    }

    async fn query_rows(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        context: &str,
    ) -> RouterResult<Vec<Row>> {
        let client = self.client().await?;
        timeout(self.statement_timeout, client.query(sql, params))
            .await
            .map_err(|_| RouterError::Timeout(self.statement_timeout.as_millis() as u64))?
            .map_err(|e| RouterError::DatabaseError(format!("{} query failed: {}", context, e)))
    }

    /// Initialize the vector extension, tables and full-text indexes
    pub async fn initialize_schema(&self, dimension: usize) -> RouterResult<()> {
        info!("Initializing knowledge schema (dimension {})", dimension);
        KnowledgeSchema::validate(dimension, 1)?;

        let client = self.client().await?;
        let mut statements = vec![
            KnowledgeSchema::create_vector_extension_sql().to_string(),
            KnowledgeSchema::create_faq_table_sql(dimension),
            KnowledgeSchema::create_document_table_sql(dimension),
        ];
        statements.extend(KnowledgeSchema::create_indexes_sql());

        for statement in statements {
            client
                .execute(statement.as_str(), &[])
                .await
                .map_err(|e| RouterError::DatabaseError(format!("Schema statement failed: {}", e)))?;
        }

        info!("Knowledge schema initialized successfully");
        Ok(())
    }

    /// Create IVFFlat cosine indexes for both corpora
    pub async fn create_vector_indexes(&self, lists: u32) -> RouterResult<()> {
        info!("Creating pgvector indexes with {} lists", lists);
        KnowledgeSchema::validate(1, lists)?;

        let client = self.client().await?;
        for corpus in [Corpus::Faq, Corpus::Document] {
            client
                .execute(KnowledgeSchema::create_vector_index_sql(corpus, lists).as_str(), &[])
                .await
                .map_err(|e| RouterError::DatabaseError(format!("Failed to create vector index: {}", e)))?;
        }

        info!("pgvector indexes created successfully");
        Ok(())
    }

    /// Row counts and pool usage
    pub async fn get_stats(&self) -> RouterResult<PostgresStats> {
        let faq_entries = self.count(Corpus::Faq, None).await?;
        let document_chunks = self.count(Corpus::Document, None).await?;
        let status = self.pool.status();

        Ok(PostgresStats {
            faq_entries,
            document_chunks,
            active_connections: status.size,
            max_connections: status.max_size,
        })
    }
}

/// Convert a projected row into a record; `None` for malformed rows
fn row_to_record(row: &Row, corpus: Corpus) -> Option<KnowledgeRecord> {
    let identity: String = match row.try_get("identity") {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Skipping {} row without identity: {}", corpus, e);
            return None;
        }
    };
    let title = row.try_get::<_, Option<String>>("title").ok().flatten();
    let content = row.try_get::<_, Option<String>>("content").ok().flatten();
    let Some(content) = content else {
        warn!("Skipping {} row {} without content", corpus, identity);
        return None;
    };

    let mut metadata = match row.try_get::<_, Option<String>>("metadata") {
        Ok(Some(text)) => serde_json::from_str::<ResultMetadata>(&text).unwrap_or_else(|e| {
            warn!("Ignoring malformed metadata on {}: {}", identity, e);
            ResultMetadata::default()
        }),
        _ => ResultMetadata::default(),
    };
    metadata.document_id = row.try_get::<_, Option<String>>("document_id").ok().flatten();
    metadata.chunk_index = row
        .try_get::<_, Option<i32>>("chunk_index")
        .ok()
        .flatten()
        .and_then(|idx| u32::try_from(idx).ok());

    let embedding = match row.try_get::<_, Option<String>>("embedding") {
        Ok(Some(text)) => match parse_vector_literal(&text) {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("Ignoring malformed embedding on {}: {}", identity, e);
                None
            }
        },
        _ => None,
    };

    Some(KnowledgeRecord {
        kind: corpus,
        identity: Some(identity),
        title: title.unwrap_or_default(),
        content,
        metadata,
        embedding,
    })
}

/// pgvector yields NaN for zero-norm embeddings; those score 0.0
fn finite_score(score: f32) -> f32 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

fn scored_rows(rows: &[Row], corpus: Corpus) -> Vec<ScoredRecord> {
    rows.iter()
        .filter_map(|row| {
            let score: f32 = match row.try_get("score") {
                Ok(score) => finite_score(score),
                Err(e) => {
                    warn!("Skipping {} row without score: {}", corpus, e);
                    return None;
                }
            };
            row_to_record(row, corpus).map(|record| ScoredRecord { record, score })
        })
        .collect()
}

#[async_trait]
impl DocumentStore for PostgresStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn text_search(&self, text: &str, query: &StoreQuery) -> RouterResult<Vec<ScoredRecord>> {
        debug!("Performing Postgres text search on {} with limit: {}", query.corpus, query.limit);

        let filter = filter_param(query.filters.as_ref());
        let limit = query.limit as i64;
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&text];
        let mut sql = format!(
            "SELECT {}, ts_rank(search_vector, plainto_tsquery('english', $1))::real AS score \
             FROM {} WHERE search_vector @@ plainto_tsquery('english', $1)",
            projection(query.corpus, query.include_embeddings),
            KnowledgeSchema::table(query.corpus)
        );
        if let Some(filter) = &filter {
            params.push(filter);
            sql.push_str(&format!(" AND metadata @> (${}::text)::jsonb", params.len()));
        }
        params.push(&limit);
        sql.push_str(&format!(" ORDER BY score DESC LIMIT ${}", params.len()));

        let rows = self.query_rows(&sql, &params, "Text search").await?;
        let hits = scored_rows(&rows, query.corpus);
        debug!("Postgres text search returned {} records", hits.len());
        Ok(hits)
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        query: &StoreQuery,
    ) -> RouterResult<Vec<ScoredRecord>> {
        debug!("Performing Postgres vector search on {} with limit: {}", query.corpus, query.limit);

        let vector = vector_literal(embedding);
        let filter = filter_param(query.filters.as_ref());
        let limit = query.limit as i64;
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&vector];
        let mut sql = format!(
            "SELECT {}, (1 - (embedding <=> ($1::text)::vector))::real AS score \
             FROM {} WHERE embedding IS NOT NULL",
            projection(query.corpus, query.include_embeddings),
            KnowledgeSchema::table(query.corpus)
        );
        if let Some(filter) = &filter {
            params.push(filter);
            sql.push_str(&format!(" AND metadata @> (${}::text)::jsonb", params.len()));
        }
        params.push(&limit);
        sql.push_str(&format!(
            " ORDER BY embedding <=> ($1::text)::vector LIMIT ${}",
            params.len()
        ));

        let rows = self.query_rows(&sql, &params, "Vector search").await?;
        let hits = scored_rows(&rows, query.corpus);
        debug!("Postgres vector search returned {} records", hits.len());
        Ok(hits)
    }

    async fn scan(&self, query: &StoreQuery) -> RouterResult<Vec<KnowledgeRecord>> {
        let filter = filter_param(query.filters.as_ref());
        let limit = query.limit as i64;
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let mut sql = format!(
            "SELECT {} FROM {} WHERE TRUE",
            projection(query.corpus, query.include_embeddings),
            KnowledgeSchema::table(query.corpus)
        );
        if query.embedded_only {
            sql.push_str(&format!(
                " AND embedding IS NOT NULL AND coalesce({}, '') <> ''",
                content_column(query.corpus)
            ));
        }
        if let Some(filter) = &filter {
            params.push(filter);
            sql.push_str(&format!(" AND metadata @> (${}::text)::jsonb", params.len()));
        }
        params.push(&limit);
        sql.push_str(&format!(" LIMIT ${}", params.len()));

        let rows = self.query_rows(&sql, &params, "Scan").await?;
        Ok(rows
            .iter()
            .filter_map(|row| row_to_record(row, query.corpus))
            .collect())
    }

    async fn count(&self, corpus: Corpus, filters: Option<&SearchFilters>) -> RouterResult<u64> {
        let filter = filter_param(filters);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let mut sql = format!("SELECT COUNT(*) FROM {}", KnowledgeSchema::table(corpus));
        if let Some(filter) = &filter {
            params.push(filter);
            sql.push_str(" WHERE metadata @> ($1::text)::jsonb");
        }

        let rows = self.query_rows(&sql, &params, "Count").await?;
        let count: i64 = rows
            .first()
            .ok_or_else(|| RouterError::DatabaseError("Count returned no rows".to_string()))?
            .try_get(0)
            .map_err(|e| RouterError::DatabaseError(format!("Failed to read count: {}", e)))?;
        Ok(count.max(0) as u64)
    }

    async fn health_check(&self) -> RouterResult<()> {
        let start = std::time::Instant::now();

        let rows = self.query_rows("SELECT 1", &[], "Health check").await?;
        if rows.is_empty() {
            return Err(RouterError::DatabaseError(
                "Health check returned no results".to_string(),
            ));
        }

        let extension = self
            .query_rows("SELECT 1 FROM pg_extension WHERE extname = 'vector'", &[], "Extension check")
            .await?;
        if extension.is_empty() {
            warn!("pgvector extension not found - vector search will use the scan fallback");
        }

        debug!("Database health check passed in {:?}", start.elapsed());
        Ok(())
    }
}

/// Postgres row counts and pool usage
#[derive(Debug, Default)]
pub struct PostgresStats {
    pub faq_entries: u64,
    pub document_chunks: u64,
    pub active_connections: usize,
    pub max_connections: usize,
}

/// Sanitize URL for logging by masking credentials
pub(crate) fn sanitize_url_for_logging(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut sanitized = parsed.clone();
        if parsed.password().is_some() {
            let _ = sanitized.set_password(Some("***"));
        }
        if !parsed.username().is_empty() {
            let _ = sanitized.set_username("***");
        }
        sanitized.to_string()
    } else if let Some(pos) = url.find("://") {
        format!("{}://***", &url[..pos])
    } else {
        "***".to_string()
    }
}
