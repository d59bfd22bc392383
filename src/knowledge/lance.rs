//! LanceDB Knowledge Store - 공유 멀티 테넌트 벡터 인덱스
//!
//! 모든 테넌트가 하나의 `knowledge` 테이블을 공유하고,
//! `tenant_id` 컬럼 필터로 삭제/검색 범위를 제한합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::{Connection, CreateTableMode};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use crate::error::StoreError;
use crate::types::{Chunk, ChunkMetadata, Metadata, TenantId};

use super::store::{validate_write, KnowledgeStore, ScoredChunk};

/// 지식 테이블 이름
const TABLE_NAME: &str = "knowledge";

// ============================================================================
// LanceKnowledgeStore
// ============================================================================

/// LanceDB 지식 저장소 구현
pub struct LanceKnowledgeStore {
    db: Connection,
}

impl LanceKnowledgeStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::Unavailable(format!("Failed to create LanceDB directory: {}", e))
                })?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| StoreError::Unavailable("Invalid path encoding".to_string()))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self { db })
    }

    /// 테이블 스키마 (임베딩 차원은 쓰기 시점에 결정)
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("source_location", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
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

    /// 청크와 벡터를 Arrow RecordBatch로 변환
    fn to_batch(
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        dimension: usize,
    ) -> Result<RecordBatch, StoreError> {
        let dimension = i32::try_from(dimension)
            .map_err(|_| StoreError::Operation(format!("Dimension too large: {}", dimension)))?;

        let tenant_ids: Vec<&str> = chunks.iter().map(|c| c.tenant_id().as_str()).collect();
        let locations: Vec<&str> = chunks
            .iter()
            .map(|c| c.metadata.source_location.as_str())
            .collect();
        let kinds: Vec<&str> = chunks.iter().map(|c| c.metadata.kind.as_str()).collect();
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let metadata = chunks
            .iter()
            .map(|c| serde_json::to_string(&c.metadata.extra))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Operation(format!("Failed to encode metadata: {}", e)))?;

        let embeddings_flat: Vec<f32> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(|e| StoreError::Operation(format!("Failed to create embedding array: {}", e)))?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(tenant_ids)),
                Arc::new(StringArray::from(locations)),
                Arc::new(StringArray::from(kinds)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(embeddings),
            ],
        )
        .map_err(|e| StoreError::Operation(format!("Failed to create RecordBatch: {}", e)))
    }

    /// 검색 결과 배치를 청크로 변환
    fn from_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>, StoreError> {
        let column = |name: &str| {
            batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| StoreError::Operation(format!("Missing {} column", name)))
        };

        let tenant_ids = column("tenant_id")?;
        let locations = column("source_location")?;
        let kinds = column("kind")?;
        let contents = column("content")?;
        let metadata = column("metadata")?;

        // _distance 컬럼 (LanceDB가 자동 추가)
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| StoreError::Operation("Missing _distance column".to_string()))?;

        let mut results = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let tenant_id = TenantId::new(tenant_ids.value(i))
                .map_err(|e| StoreError::Operation(e.to_string()))?;
            let kind = kinds
                .value(i)
                .parse()
                .map_err(|e: crate::error::ConfigError| StoreError::Operation(e.to_string()))?;
            let extra: Metadata = serde_json::from_str(metadata.value(i))
                .map_err(|e| StoreError::Operation(format!("Invalid metadata: {}", e)))?;

            results.push(ScoredChunk {
                chunk: Chunk {
                    content: contents.value(i).to_string(),
                    metadata: ChunkMetadata {
                        tenant_id,
                        source_location: locations.value(i).to_string(),
                        kind,
                        extra,
                    },
                },
                // 코사인 거리 -> 유사도
                similarity: 1.0 - distances.value(i),
            });
        }

        Ok(results)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> Result<bool, StoreError> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to list tables: {}", e)))?;
        Ok(names.iter().any(|name| name == TABLE_NAME))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table, StoreError> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open table: {}", e)))
    }

    /// 빈 테이블 생성 (이미 있으면 열기)
    ///
    /// 다른 테넌트의 첫 쓰기와 동시에 실행되어도 한쪽이 생성한 테이블을 엽니다.
    async fn create_or_open_table(
        &self,
        dimension: usize,
    ) -> Result<lancedb::table::Table, StoreError> {
        let dimension = i32::try_from(dimension)
            .map_err(|_| StoreError::Operation(format!("Dimension too large: {}", dimension)))?;

        let created = self
            .db
            .create_empty_table(TABLE_NAME, Arc::new(Self::create_schema(dimension)))
            .mode(CreateTableMode::exist_ok(|builder| builder))
            .execute()
            .await;

        match created {
            Ok(table) => Ok(table),
            // 생성 경합에서 진 쪽은 상대가 만든 테이블을 사용
            Err(e) if self.table_exists().await? => {
                tracing::debug!("Table created concurrently, opening it ({})", e);
                self.open_table().await
            }
            Err(e) => Err(StoreError::Operation(format!("Failed to create table: {}", e))),
        }
    }

    /// 테이블의 임베딩 차원
    async fn table_dimension(table: &lancedb::table::Table) -> Result<usize, StoreError> {
        let schema = table
            .schema()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to read table schema: {}", e)))?;

        match schema.field_with_name("embedding").map(|f| f.data_type()) {
            Ok(DataType::FixedSizeList(_, size)) => usize::try_from(*size)
                .map_err(|_| StoreError::Operation(format!("Invalid embedding size: {}", size))),
            _ => Err(StoreError::Operation(
                "Table has no fixed-size embedding column".to_string(),
            )),
        }
    }

    /// 쓰려는 벡터 차원이 테이블과 같은지 확인
    async fn check_dimension(
        table: &lancedb::table::Table,
        dimension: usize,
    ) -> Result<(), StoreError> {
        let expected = Self::table_dimension(table).await?;
        if expected != dimension {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: dimension,
            });
        }
        Ok(())
    }
}

/// 테넌트 필터 조건식
fn tenant_filter(tenant: &TenantId) -> String {
    format!("tenant_id = '{}'", tenant.as_str().replace('\'', "''"))
}

#[async_trait]
impl KnowledgeStore for LanceKnowledgeStore {
    async fn replace(
        &self,
        tenant: &TenantId,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        let dimension = validate_write(tenant, chunks, vectors)?;
        let filter = tenant_filter(tenant);

        let existing = if self.table_exists().await? {
            Some(self.open_table().await?)
        } else {
            None
        };

        // 차원 불일치는 삭제 전에 거부 (기존 파티션 보존)
        if let (Some(table), Some(dimension)) = (&existing, dimension) {
            Self::check_dimension(table, dimension).await?;
        }

        // 1. 기존 파티션 삭제
        if let Some(table) = &existing {
            table
                .delete(&filter)
                .await
                .map_err(|e| StoreError::Operation(format!("Failed to delete vectors: {}", e)))?;
        }

        let dimension = match dimension {
            Some(d) => d,
            None => {
                tracing::info!("Cleared knowledge base for tenant {}", tenant);
                return Ok(0);
            }
        };

        // 2. 새 파티션 삽입
        let table = match existing {
            Some(table) => table,
            None => {
                let table = self.create_or_open_table(dimension).await?;
                Self::check_dimension(&table, dimension).await?;
                table
            }
        };

        let batch = Self::to_batch(chunks, vectors, dimension)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(batches)
            .execute()
            .await
            .map_err(|e| StoreError::Operation(format!("Failed to add vectors: {}", e)))?;

        tracing::info!(
            "Replaced knowledge base for tenant {} ({} chunks, dim={})",
            tenant,
            chunks.len(),
            dimension
        );

        Ok(chunks.len())
    }

    async fn search(
        &self,
        tenant: &TenantId,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if k == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;
        let filter = tenant_filter(tenant);

        let available = table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| StoreError::Operation(format!("Failed to count rows: {}", e)))?;
        if available == 0 {
            return Ok(vec![]);
        }

        // 테넌트 필터는 사전 필터로 적용되어 k개 모두 해당 테넌트에서 선택됨
        let stream = table
            .vector_search(query_vector.to_vec())
            .map_err(|e| StoreError::Operation(format!("Failed to create vector search: {}", e)))?
            .distance_type(DistanceType::Cosine)
            .only_if(filter)
            .limit(k.min(available))
            .execute()
            .await
            .map_err(|e| StoreError::Operation(format!("Failed to execute vector search: {}", e)))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| StoreError::Operation(format!("Failed to read search results: {}", e)))?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(Self::from_batch(batch)?);
        }

        // 테넌트 필터 결과 재확인
        results.retain(|r| r.chunk.tenant_id() == tenant);
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(k);

        Ok(results)
    }

    async fn count(&self, tenant: &TenantId) -> Result<usize, StoreError> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        table
            .count_rows(Some(tenant_filter(tenant)))
            .await
            .map_err(|e| StoreError::Operation(format!("Failed to count rows: {}", e)))
    }

    fn name(&self) -> &str {
        "lancedb"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }

    /// `hot` 위치만 1.0인 단위 벡터
    fn one_hot(hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; DIM];
        v[hot % DIM] = 1.0;
        v
    }

    fn chunks_for(id: &str, contents: &[&str]) -> (Vec<Chunk>, Vec<Vec<f32>>) {
        let chunks = contents
            .iter()
            .enumerate()
            .map(|(i, content)| {
                let mut extra = Metadata::new();
                extra.insert("chunk_index".to_string(), i.into());
                Chunk {
                    content: content.to_string(),
                    metadata: ChunkMetadata {
                        tenant_id: tenant(id),
                        source_location: format!("https://example.com/{}", id),
                        kind: ResourceKind::Webpage,
                        extra,
                    },
                }
            })
            .collect();
        let vectors = (0..contents.len()).map(one_hot).collect();
        (chunks, vectors)
    }

    async fn open_store(dir: &TempDir) -> LanceKnowledgeStore {
        LanceKnowledgeStore::open(&dir.path().join("knowledge.lance"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lance_replace_and_count() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        assert_eq!(store.count(&tenant("lp-1")).await.unwrap(), 0);

        let (chunks, vectors) = chunks_for("lp-1", &["a", "b", "c"]);
        let inserted = store.replace(&tenant("lp-1"), &chunks, &vectors).await.unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(store.count(&tenant("lp-1")).await.unwrap(), 3);
        assert_eq!(store.count(&tenant("lp-2")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lance_search_round_trips_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let (chunks, vectors) = chunks_for("lp-1", &["first", "second", "third"]);
        store.replace(&tenant("lp-1"), &chunks, &vectors).await.unwrap();

        let results = store.search(&tenant("lp-1"), &one_hot(1), 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.content, "second");
        assert_eq!(results[0].chunk.metadata.kind, ResourceKind::Webpage);
        assert_eq!(results[0].chunk.metadata.extra["chunk_index"], 1);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_lance_tenant_isolation() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let (a_chunks, a_vectors) = chunks_for("lp-a", &["a0", "a1"]);
        store.replace(&tenant("lp-a"), &a_chunks, &a_vectors).await.unwrap();

        // B는 A 이후에 삽입되고 모든 쿼리 방향을 덮음
        let contents: Vec<String> = (0..DIM).map(|i| format!("b{}", i)).collect();
        let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
        let (b_chunks, b_vectors) = chunks_for("lp-b", &refs);
        store.replace(&tenant("lp-b"), &b_chunks, &b_vectors).await.unwrap();

        for hot in 0..DIM {
            let results = store.search(&tenant("lp-a"), &one_hot(hot), 10).await.unwrap();
            assert!(!results.is_empty());
            assert!(results.iter().all(|r| r.chunk.tenant_id().as_str() == "lp-a"));
        }
    }

    #[tokio::test]
    async fn test_lance_replace_discards_previous_version() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let (v1, v1_vectors) = chunks_for("lp-1", &["v1-a", "v1-b", "v1-c"]);
        store.replace(&tenant("lp-1"), &v1, &v1_vectors).await.unwrap();
        let (other, other_vectors) = chunks_for("lp-2", &["other"]);
        store.replace(&tenant("lp-2"), &other, &other_vectors).await.unwrap();

        let (v2, v2_vectors) = chunks_for("lp-1", &["v2-a"]);
        store.replace(&tenant("lp-1"), &v2, &v2_vectors).await.unwrap();

        let results = store.search(&tenant("lp-1"), &one_hot(0), 100).await.unwrap();
        let contents: Vec<_> = results.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(contents, vec!["v2-a"]);
        assert_eq!(store.count(&tenant("lp-2")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lance_concurrent_first_writes() {
        for _ in 0..5 {
            let temp_dir = TempDir::new().unwrap();
            let store = open_store(&temp_dir).await;

            let (a_chunks, a_vectors) = chunks_for("lp-a", &["a0"]);
            let (b_chunks, b_vectors) = chunks_for("lp-b", &["b0", "b1"]);
            let tenant_a = tenant("lp-a");
            let tenant_b = tenant("lp-b");
            let (a, b) = tokio::join!(
                store.replace(&tenant_a, &a_chunks, &a_vectors),
                store.replace(&tenant_b, &b_chunks, &b_vectors),
            );

            assert_eq!(a.unwrap(), 1);
            assert_eq!(b.unwrap(), 2);
            assert_eq!(store.count(&tenant("lp-a")).await.unwrap(), 1);
            assert_eq!(store.count(&tenant("lp-b")).await.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn test_lance_dimension_change_keeps_previous_knowledge() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let (chunks, vectors) = chunks_for("lp-1", &["a", "b"]);
        store.replace(&tenant("lp-1"), &chunks, &vectors).await.unwrap();

        let (smaller, _) = chunks_for("lp-1", &["c"]);
        let err = store
            .replace(&tenant("lp-1"), &smaller, &[vec![1.0; 4]])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: DIM,
                actual: 4
            }
        ));
        assert_eq!(store.count(&tenant("lp-1")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lance_empty_replace_clears_tenant() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let (chunks, vectors) = chunks_for("lp-1", &["a", "b"]);
        store.replace(&tenant("lp-1"), &chunks, &vectors).await.unwrap();

        assert_eq!(store.replace(&tenant("lp-1"), &[], &[]).await.unwrap(), 0);
        assert_eq!(store.count(&tenant("lp-1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lance_search_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let results = store.search(&tenant("lp-1"), &one_hot(0), 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_tenant_filter_escapes_quotes() {
        assert_eq!(tenant_filter(&tenant("lp-1")), "tenant_id = 'lp-1'");
    }
}
