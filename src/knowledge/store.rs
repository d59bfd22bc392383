//! Knowledge Store - 멀티 테넌트 벡터 저장소 트레이트
//!
//! 모든 테넌트의 `(Chunk, EmbeddingVector)`를 하나의 컬렉션에 저장하고
//! 메타데이터의 `tenant_id`로 논리적으로 분리합니다.
//! 물리적 분리가 없으므로 모든 연산은 `&TenantId`를 필수 인자로 받습니다.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Chunk, TenantId};

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 (유사도 포함)
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// 코사인 유사도 (높을수록 가까움)
    pub similarity: f32,
}

// ============================================================================
// KnowledgeStore Trait
// ============================================================================

/// 지식 저장소 트레이트 (async)
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// 테넌트의 모든 엔트리를 삭제한 뒤 새 엔트리를 삽입
    ///
    /// 삭제와 삽입 사이는 트랜잭션이 아닙니다. 중간 실패 시 테넌트 파티션이
    /// 비어있거나 일부만 채워질 수 있습니다.
    ///
    /// # Returns
    /// 삽입된 엔트리 수
    async fn replace(
        &self,
        tenant: &TenantId,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, StoreError>;

    /// 테넌트 범위 최근접 이웃 검색 (가까운 순, 최대 `k`개)
    async fn search(
        &self,
        tenant: &TenantId,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// 테넌트의 엔트리 수
    async fn count(&self, tenant: &TenantId) -> Result<usize, StoreError>;

    /// 저장소 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 쓰기 입력 검증
///
/// 청크/벡터 개수, 벡터 차원 일관성, 청크의 테넌트 태그를 확인합니다.
///
/// # Returns
/// 벡터 차원 (입력이 비어있으면 None)
pub fn validate_write(
    tenant: &TenantId,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> Result<Option<usize>, StoreError> {
    if chunks.len() != vectors.len() {
        return Err(StoreError::LengthMismatch {
            chunks: chunks.len(),
            vectors: vectors.len(),
        });
    }

    if let Some(chunk) = chunks.iter().find(|c| c.tenant_id() != tenant) {
        return Err(StoreError::TenantMismatch {
            expected: tenant.to_string(),
            actual: chunk.tenant_id().to_string(),
        });
    }

    let dimension = match vectors.first() {
        Some(first) => first.len(),
        None => return Ok(None),
    };

    if let Some(v) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: v.len(),
        });
    }

    Ok(Some(dimension))
}

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkMetadata, ResourceKind};

    fn chunk(tenant: &str) -> Chunk {
        Chunk {
            content: "text".to_string(),
            metadata: ChunkMetadata {
                tenant_id: TenantId::new(tenant).unwrap(),
                source_location: "a.txt".to_string(),
                kind: ResourceKind::Text,
                extra: Default::default(),
            },
        }
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatched() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_validate_write() {
        let tenant = TenantId::new("lp-1").unwrap();

        assert_eq!(validate_write(&tenant, &[], &[]).unwrap(), None);
        assert_eq!(
            validate_write(&tenant, &[chunk("lp-1")], &[vec![0.1, 0.2]]).unwrap(),
            Some(2)
        );

        assert!(matches!(
            validate_write(&tenant, &[chunk("lp-1")], &[]),
            Err(StoreError::LengthMismatch { .. })
        ));
        assert!(matches!(
            validate_write(&tenant, &[chunk("lp-2")], &[vec![0.1]]),
            Err(StoreError::TenantMismatch { .. })
        ));
        assert!(matches!(
            validate_write(
                &tenant,
                &[chunk("lp-1"), chunk("lp-1")],
                &[vec![0.1], vec![0.1, 0.2]]
            ),
            Err(StoreError::DimensionMismatch { .. })
        ));
    }
}
