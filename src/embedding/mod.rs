//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 설정 열거형으로 선택하는 교체 가능한 임베딩 백엔드를 제공합니다.
//! 백엔드마다 벡터 차원이 다르므로 한 테넌트의 지식 저장소 수명 동안
//! 같은 백엔드를 유지해야 합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(EmbeddingBackend::Gemini)?;
//! let vectors = embed_chunks(embedder.as_ref(), &chunks).await?;
//! ```

mod gemini;
mod hashing;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod openai;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, EmbeddingError};
use crate::types::Chunk;

pub use gemini::GeminiEmbedding;
pub use hashing::HashingEmbedding;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::FastEmbedding;
pub use openai::OpenAiEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 문서 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// 검색 질의 임베딩 (기본 구현: 문서와 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 청크 임베딩 (청크당 벡터 하나, 순서 유지)
///
/// 반환된 벡터 개수와 차원을 프로바이더 설정과 대조합니다.
pub async fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    chunks: &[Chunk],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if chunks.is_empty() {
        return Ok(vec![]);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = provider.embed_batch(&texts).await?;

    if vectors.len() != chunks.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: chunks.len(),
            actual: vectors.len(),
        });
    }

    let expected = provider.dimension();
    if let Some(v) = vectors.iter().find(|v| v.len() != expected) {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: v.len(),
        });
    }

    tracing::debug!(
        "Embedded {} chunks with {} (dim={})",
        chunks.len(),
        provider.name(),
        expected
    );

    Ok(vectors)
}

// ============================================================================
// Embedding Backend
// ============================================================================

/// 임베딩 백엔드 선택
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Gemini gemini-embedding-001 (768차원)
    #[default]
    Gemini,
    /// OpenAI text-embedding-3-small (1536차원)
    OpenAi,
    /// fastembed all-minilm-l6-v2 (384차원, 첫 사용 시 모델 다운로드)
    Local,
    /// 해싱 임베딩 (384차원, 다운로드 없음, 테스트/오프라인용)
    Hashing,
}

impl EmbeddingBackend {
    pub const ALL: [EmbeddingBackend; 4] = [
        EmbeddingBackend::Gemini,
        EmbeddingBackend::OpenAi,
        EmbeddingBackend::Local,
        EmbeddingBackend::Hashing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingBackend::Gemini => "gemini",
            EmbeddingBackend::OpenAi => "openai",
            EmbeddingBackend::Local => "local",
            EmbeddingBackend::Hashing => "hashing",
        }
    }

    /// 백엔드별 벡터 차원
    pub fn dimension(&self) -> usize {
        match self {
            EmbeddingBackend::Gemini => gemini::DEFAULT_DIMENSION,
            EmbeddingBackend::OpenAi => openai::DEFAULT_DIMENSION,
            // all-minilm-l6-v2
            EmbeddingBackend::Local => 384,
            EmbeddingBackend::Hashing => hashing::DEFAULT_DIMENSION,
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownBackend(s.to_string()))
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// Gemini API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Option<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Some(key);
            }
        }
    }
    None
}

/// Gemini API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_some()
}

/// OpenAI API 키 로드 (`OPENAI_API_KEY`)
pub fn get_openai_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
}

// ============================================================================
// Factory Function
// ============================================================================

/// 백엔드 설정으로 임베딩 프로바이더 생성
pub fn create_embedder(
    backend: EmbeddingBackend,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let embedder: Arc<dyn EmbeddingProvider> = match backend {
        EmbeddingBackend::Gemini => {
            let api_key = get_api_key()
                .ok_or(EmbeddingError::MissingApiKey("GEMINI_API_KEY or GOOGLE_AI_API_KEY"))?;
            Arc::new(GeminiEmbedding::new(api_key)?)
        }
        EmbeddingBackend::OpenAi => {
            let api_key =
                get_openai_api_key().ok_or(EmbeddingError::MissingApiKey("OPENAI_API_KEY"))?;
            Arc::new(OpenAiEmbedding::new(api_key)?)
        }
        #[cfg(feature = "local-embeddings-fastembed")]
        EmbeddingBackend::Local => Arc::new(FastEmbedding::new()?),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        EmbeddingBackend::Local => {
            return Err(EmbeddingError::InvalidConfig(
                "local embeddings require --features local-embeddings-fastembed".to_string(),
            ))
        }
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedding::new()),
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkMetadata, ResourceKind, TenantId};

    /// 잘못된 차원을 돌려주는 프로바이더
    struct BrokenEmbedding;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.0; 3])
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn chunk(content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                tenant_id: TenantId::new("lp-1").unwrap(),
                source_location: "a.txt".to_string(),
                kind: ResourceKind::Text,
                extra: Default::default(),
            },
        }
    }

    #[test]
    fn test_backend_parse_and_dimension() {
        assert_eq!("gemini".parse::<EmbeddingBackend>(), Ok(EmbeddingBackend::Gemini));
        assert_eq!("OpenAI".parse::<EmbeddingBackend>(), Ok(EmbeddingBackend::OpenAi));
        assert!("word2vec".parse::<EmbeddingBackend>().is_err());

        assert_eq!(EmbeddingBackend::Gemini.dimension(), 768);
        assert_eq!(EmbeddingBackend::OpenAi.dimension(), 1536);
        assert_eq!(EmbeddingBackend::Local.dimension(), 384);
        assert_eq!(EmbeddingBackend::Hashing.dimension(), 384);
    }

    #[tokio::test]
    async fn test_embed_chunks_preserves_order() {
        let embedder = HashingEmbedding::new();
        let chunks = vec![chunk("cells divide"), chunk("planets orbit"), chunk("cells divide")];

        let vectors = embed_chunks(&embedder, &chunks).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn test_embed_chunks_rejects_wrong_dimension() {
        let result = embed_chunks(&BrokenEmbedding, &[chunk("x")]).await;
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_offline_backends_need_no_key() {
        let embedder = create_embedder(EmbeddingBackend::Hashing).unwrap();
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.name(), "hashing");
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    #[tokio::test]
    async fn test_local_backend_uses_fastembed() {
        let embedder = create_embedder(EmbeddingBackend::Local).unwrap();
        assert_eq!(embedder.dimension(), EmbeddingBackend::Local.dimension());
        assert!(embedder.name().starts_with("fastembed/"));
    }
}
