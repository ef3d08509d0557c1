//! LanceDB Vector Store - 임베디드 벡터 검색
//!
//! 청크 텍스트, 임베딩, 문서 메타데이터를 하나의 테이블에 저장합니다.
//! 검색은 코사인 거리를 사용하며 유사도는 `1 - distance`입니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;
use tokio::sync::Mutex;

use super::vector::{summarize_documents, DocumentSummary, SearchResult, VectorEntry, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "documents";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 테이블은 첫 삽입 시 생성되며, 임베딩 차원은 첫 배치에서 결정됩니다.
pub struct LanceVectorStore {
    db: Connection,
    /// 테이블 생성/삭제 경합 방지
    write_lock: Mutex<()>,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        tracing::debug!("Vector store opened at {:?}", path);

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("doc_name", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new("added_at", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        let first = entries
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty entries"))?;

        let dimension = first.embedding.len();
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be greater than 0");
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch for chunk {}: expected {}, got {}",
                bad.chunk_id,
                dimension,
                bad.embedding.len()
            );
        }
        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        let column = |f: fn(&VectorEntry) -> &str| -> StringArray {
            StringArray::from(entries.iter().map(f).collect::<Vec<&str>>())
        };

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(column(|e| e.chunk_id.as_str())),
                Arc::new(column(|e| e.doc_id.as_str())),
                Arc::new(column(|e| e.doc_name.as_str())),
                Arc::new(column(|e| e.source.as_str())),
                Arc::new(Int32Array::from(
                    entries.iter().map(|e| e.chunk_index).collect::<Vec<i32>>(),
                )),
                Arc::new(column(|e| e.chunk_text.as_str())),
                Arc::new(column(|e| e.added_at.as_str())),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    /// 테이블 열기 (없으면 None)
    async fn open_table(&self) -> Result<Option<lancedb::table::Table>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table")?;
        Ok(Some(table))
    }

    /// 필터에 맞는 행 삭제, 삭제된 행 수 반환
    async fn delete_where(&self, filter: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let matching = table
            .count_rows(Some(filter.to_string()))
            .await
            .context("Failed to count rows for delete")?;

        if matching == 0 {
            return Ok(0);
        }

        table
            .delete(filter)
            .await
            .context("Failed to delete vectors")?;

        tracing::debug!("Deleted {} chunks ({})", matching, filter);
        Ok(matching)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let _guard = self.write_lock.lock().await;

        match self.open_table().await? {
            Some(table) => {
                table
                    .add(batches)
                    .execute()
                    .await
                    .context("Failed to add vectors to table")?;
            }
            None => {
                self.db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .context("Failed to create table")?;
            }
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let results = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut search_results = Vec::new();

        for batch in batches {
            let doc_ids = string_column(&batch, "doc_id")?;
            let doc_names = string_column(&batch, "doc_name")?;
            let chunk_texts = string_column(&batch, "chunk_text")?;

            let chunk_indices = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                search_results.push(SearchResult {
                    doc_id: doc_ids.value(i).to_string(),
                    doc_name: doc_names.value(i).to_string(),
                    chunk_index: chunk_indices.value(i),
                    chunk_text: chunk_texts.value(i).to_string(),
                    similarity: 1.0 - distances.value(i),
                });
            }
        }

        search_results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(search_results)
    }

    async fn delete_by_doc_name(&self, doc_name: &str) -> Result<usize> {
        let filter = format!("doc_name = {}", sql_quote(doc_name));
        self.delete_where(&filter).await
    }

    async fn delete_by_doc_name_except(&self, doc_name: &str, keep_doc_id: &str) -> Result<usize> {
        let filter = format!(
            "doc_name = {} AND doc_id != {}",
            sql_quote(doc_name),
            sql_quote(keep_doc_id)
        );
        self.delete_where(&filter).await
    }

    async fn count(&self) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }

    async fn documents(&self) -> Result<Vec<DocumentSummary>> {
        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let total = table.count_rows(None).await.context("Failed to count rows")?;
        if total == 0 {
            return Ok(vec![]);
        }

        let stream = table
            .query()
            .select(Select::Columns(vec![
                "doc_id".to_string(),
                "doc_name".to_string(),
                "source".to_string(),
                "added_at".to_string(),
            ]))
            .limit(total)
            .execute()
            .await
            .context("Failed to scan document metadata")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut rows = Vec::with_capacity(total);

        for batch in batches {
            let doc_ids = string_column(&batch, "doc_id")?;
            let doc_names = string_column(&batch, "doc_name")?;
            let sources = string_column(&batch, "source")?;
            let added = string_column(&batch, "added_at")?;

            for i in 0..batch.num_rows() {
                rows.push((
                    doc_ids.value(i).to_string(),
                    doc_names.value(i).to_string(),
                    sources.value(i).to_string(),
                    added.value(i).to_string(),
                ));
            }
        }

        Ok(summarize_documents(rows))
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if self.table_exists().await? {
            self.db
                .drop_table(TABLE_NAME)
                .await
                .context("Failed to drop vector table")?;
            tracing::info!("Vector table dropped");
        }

        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// RecordBatch에서 문자열 컬럼 꺼내기
fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

/// SQL 문자열 리터럴 (작은따옴표 이스케이프)
fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// ============================================================================
// Tests
// ============================================================================
