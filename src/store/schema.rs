/// Schema definitions for the FAQ and document chunk tables
///
/// Both tables carry a `metadata jsonb` column (category, tags and any
/// other filterable fields), an optional `embedding vector(N)` and a
/// generated `tsvector` used for full-text ranking.
use crate::error::{RouterError, RouterResult};
use crate::types::Corpus;

pub const FAQ_TABLE: &str = "faq_entries";
pub const DOCUMENT_TABLE: &str = "document_chunks";

/// Schema manager
pub struct KnowledgeSchema;

impl KnowledgeSchema {
    pub fn create_vector_extension_sql() -> &'static str {
        "CREATE EXTENSION IF NOT EXISTS vector"
    }

    /// FAQ table DDL for embeddings of `dimension`
    pub fn create_faq_table_sql(dimension: usize) -> String {
        format!(
            "
            CREATE TABLE IF NOT EXISTS {FAQ_TABLE} (
                faq_key TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                embedding vector({dimension}),
                search_vector tsvector GENERATED ALWAYS AS (
                    to_tsvector('english', coalesce(question, '') || ' ' || coalesce(answer, ''))
                ) STORED,
                updated_at TIMESTAMPTZ DEFAULT NOW()
            )
            "
        )
    }

    /// Document chunk table DDL for embeddings of `dimension`
    pub fn create_document_table_sql(dimension: usize) -> String {
        format!(
            "
            CREATE TABLE IF NOT EXISTS {DOCUMENT_TABLE} (
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                embedding vector({dimension}),
                search_vector tsvector GENERATED ALWAYS AS (
                    to_tsvector('english', coalesce(title, '') || ' ' || coalesce(content, ''))
                ) STORED,
                updated_at TIMESTAMPTZ DEFAULT NOW(),
                PRIMARY KEY (document_id, chunk_index)
            )
            "
        )
    }

    /// Full-text and metadata indexes
    pub fn create_indexes_sql() -> Vec<String> {
        [FAQ_TABLE, DOCUMENT_TABLE]
            .iter()
            .flat_map(|table| {
                [
                    format!(
                        "CREATE INDEX IF NOT EXISTS idx_{table}_search_vector ON {table} USING GIN (search_vector)"
                    ),
                    format!(
                        "CREATE INDEX IF NOT EXISTS idx_{table}_metadata ON {table} USING GIN (metadata jsonb_path_ops)"
                    ),
                ]
            })
            .collect()
    }

    /// IVFFlat cosine index for one corpus table
    pub fn create_vector_index_sql(corpus: Corpus, lists: u32) -> String {
        let table = Self::table(corpus);
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_embedding_ivfflat ON {table} \
             USING ivfflat (embedding vector_cosine_ops) WITH (lists = {lists})"
        )
    }

    pub fn table(corpus: Corpus) -> &'static str {
        match corpus {
            Corpus::Faq => FAQ_TABLE,
            Corpus::Document => DOCUMENT_TABLE,
        }
    }

    /// Validate schema parameters before issuing DDL
    pub fn validate(dimension: usize, lists: u32) -> RouterResult<()> {
        // pgvector's ivfflat limit
        if dimension == 0 || dimension > 2000 {
            return Err(RouterError::ConfigError(format!(
                "Embedding dimension {} is not indexable (1..=2000)",
                dimension
            )));
        }
        if lists == 0 {
            return Err(RouterError::ConfigError(
                "IVFFlat lists must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
