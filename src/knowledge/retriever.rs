//! Retriever - 테넌트 범위 top-k 검색
//!
//! 질문을 수집 시와 같은 임베딩 백엔드로 임베딩한 뒤
//! `KnowledgeStore::search`에 위임합니다. 백엔드가 다르면 에러 없이
//! 검색 품질만 떨어지므로, 엔진은 하나의 프로바이더를 양쪽에 공유합니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::RetrievalError;
use crate::types::TenantId;

use super::store::{KnowledgeStore, ScoredChunk};

/// 검색기
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn KnowledgeStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { embedder, store }
    }

    /// 질문과 가까운 청크 최대 `k`개 (가까운 순)
    pub async fn retrieve(
        &self,
        question: &str,
        tenant: &TenantId,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let query_vector = self.embedder.embed_query(question).await?;
        let results = self.store.search(tenant, &query_vector, k).await?;

        tracing::debug!(
            "Retrieved {} chunks for tenant {} (k={})",
            results.len(),
            tenant,
            k
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{embed_chunks, HashingEmbedding};
    use crate::knowledge::InMemoryKnowledgeStore;
    use crate::types::{Chunk, ChunkMetadata, ResourceKind};

    fn chunk(tenant: &TenantId, content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                tenant_id: tenant.clone(),
                source_location: "notes.txt".to_string(),
                kind: ResourceKind::Text,
                extra: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_retrieve_ranks_relevant_chunk_first() {
        let tenant = TenantId::new("lp-1").unwrap();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedding::new());
        let store = Arc::new(InMemoryKnowledgeStore::new());

        let chunks = vec![
            chunk(&tenant, "Photosynthesis converts light into chemical energy."),
            chunk(&tenant, "The mitochondria is the powerhouse of the cell."),
            chunk(&tenant, "Rivers erode valleys over millions of years."),
        ];
        let vectors = embed_chunks(embedder.as_ref(), &chunks).await.unwrap();
        store.replace(&tenant, &chunks, &vectors).await.unwrap();

        let retriever = Retriever::new(embedder, store);
        let results = retriever
            .retrieve("What is the powerhouse of the cell?", &tenant, 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.content.contains("mitochondria"));
    }

    #[tokio::test]
    async fn test_retrieve_unknown_tenant_is_empty() {
        let retriever = Retriever::new(
            Arc::new(HashingEmbedding::new()),
            Arc::new(InMemoryKnowledgeStore::new()),
        );
        let results = retriever
            .retrieve("anything", &TenantId::new("lp-9").unwrap(), 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
