//! In-Memory Knowledge Store
//!
//! 전체 스캔 코사인 유사도 검색을 사용하는 메모리 저장소입니다.
//! 테스트와 `--memory` 실행에 사용됩니다.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{Chunk, TenantId};

use super::store::{cosine_similarity, validate_write, KnowledgeStore, ScoredChunk};

#[derive(Debug, Clone)]
struct StoredEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// 메모리 지식 저장소
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    entries: RwLock<Vec<StoredEntry>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 전체 엔트리 수 (모든 테넌트)
    pub async fn total_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn replace(
        &self,
        tenant: &TenantId,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        validate_write(tenant, chunks, vectors)?;

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.chunk.tenant_id() != tenant);
        let deleted = before - entries.len();

        entries.extend(chunks.iter().zip(vectors).map(|(chunk, vector)| StoredEntry {
            chunk: chunk.clone(),
            vector: vector.clone(),
        }));

        tracing::debug!(
            "Replaced tenant {}: deleted={}, inserted={}",
            tenant,
            deleted,
            chunks.len()
        );

        Ok(chunks.len())
    }

    async fn search(
        &self,
        tenant: &TenantId,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if k == 0 {
            return Ok(vec![]);
        }

        let entries = self.entries.read().await;
        let mut results: Vec<ScoredChunk> = entries
            .iter()
            .filter(|e| e.chunk.tenant_id() == tenant)
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                similarity: cosine_similarity(query_vector, &e.vector),
            })
            .collect();

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(k);

        Ok(results)
    }

    async fn count(&self, tenant: &TenantId) -> Result<usize, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| e.chunk.tenant_id() == tenant).count())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkMetadata, ResourceKind};

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }

    fn entry(tenant_id: &str, content: &str, vector: Vec<f32>) -> (Chunk, Vec<f32>) {
        let chunk = Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                tenant_id: tenant(tenant_id),
                source_location: format!("{}.txt", content),
                kind: ResourceKind::Text,
                extra: Default::default(),
            },
        };
        (chunk, vector)
    }

    async fn replace_all(store: &InMemoryKnowledgeStore, id: &str, items: Vec<(Chunk, Vec<f32>)>) {
        let (chunks, vectors): (Vec<_>, Vec<_>) = items.into_iter().unzip();
        store.replace(&tenant(id), &chunks, &vectors).await.unwrap();
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryKnowledgeStore::new();
        replace_all(
            &store,
            "lp-1",
            vec![
                entry("lp-1", "far", vec![0.0, 1.0]),
                entry("lp-1", "near", vec![1.0, 0.1]),
                entry("lp-1", "mid", vec![1.0, 1.0]),
            ],
        )
        .await;

        let results = store.search(&tenant("lp-1"), &[1.0, 0.0], 2).await.unwrap();
        let contents: Vec<_> = results.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(contents, vec!["near", "mid"]);
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let store = InMemoryKnowledgeStore::new();
        replace_all(&store, "lp-a", vec![entry("lp-a", "a-fact", vec![0.0, 1.0])]).await;
        // B는 A 이후에 삽입되고 쿼리와 정확히 일치
        replace_all(
            &store,
            "lp-b",
            vec![
                entry("lp-b", "b-fact-1", vec![1.0, 0.0]),
                entry("lp-b", "b-fact-2", vec![0.9, 0.1]),
            ],
        )
        .await;

        for query in [[1.0, 0.0], [0.0, 1.0], [-1.0, -1.0]] {
            let results = store.search(&tenant("lp-a"), &query, 100).await.unwrap();
            assert_eq!(results.len(), 1);
            assert!(results.iter().all(|r| r.chunk.tenant_id().as_str() == "lp-a"));
        }

        let results = store.search(&tenant("lp-c"), &[1.0, 0.0], 100).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_replace_discards_previous_version() {
        let store = InMemoryKnowledgeStore::new();
        replace_all(
            &store,
            "lp-1",
            vec![entry("lp-1", "v1-a", vec![1.0, 0.0]), entry("lp-1", "v1-b", vec![0.0, 1.0])],
        )
        .await;
        replace_all(&store, "lp-2", vec![entry("lp-2", "other", vec![1.0, 0.0])]).await;
        replace_all(&store, "lp-1", vec![entry("lp-1", "v2-a", vec![1.0, 1.0])]).await;

        let results = store
            .search(&tenant("lp-1"), &[1.0, 0.0], usize::MAX)
            .await
            .unwrap();
        let contents: Vec<_> = results.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(contents, vec!["v2-a"]);

        // 다른 테넌트는 영향 없음
        assert_eq!(store.count(&tenant("lp-2")).await.unwrap(), 1);
        assert_eq!(store.total_count().await, 2);
    }

    #[tokio::test]
    async fn test_replace_rejects_foreign_chunks() {
        let store = InMemoryKnowledgeStore::new();
        let (chunk, vector) = entry("lp-2", "sneaky", vec![1.0]);

        let result = store.replace(&tenant("lp-1"), &[chunk], &[vector]).await;
        assert!(matches!(result, Err(StoreError::TenantMismatch { .. })));
        assert_eq!(store.total_count().await, 0);
    }

    #[tokio::test]
    async fn test_replace_with_empty_clears_tenant() {
        let store = InMemoryKnowledgeStore::new();
        replace_all(&store, "lp-1", vec![entry("lp-1", "a", vec![1.0])]).await;
        replace_all(&store, "lp-1", vec![]).await;
        assert_eq!(store.count(&tenant("lp-1")).await.unwrap(), 0);
    }
}
