//! 로컬 임베딩 (fastembed)
//!
//! ONNX 모델을 로컬에서 실행합니다. 첫 사용 시 Hugging Face에서 모델을
//! 내려받아 캐시하고, 이후에는 네트워크 없이 동작합니다.
//! 추론은 블로킹이므로 `spawn_blocking`에서 실행합니다.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::EmbeddingError;

use super::EmbeddingProvider;

/// 기본 모델
pub const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

/// 기본 모델의 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 384;

const BATCH_SIZE: usize = 64;

/// 모델 이름 → (fastembed 모델, 차원)
fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    match name {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "multilingual-e5-small" => Ok((EmbeddingModel::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((EmbeddingModel::MultilingualE5Base, 768)),
        other => Err(EmbeddingError::InvalidConfig(format!(
            "unknown local embedding model '{}' (supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, multilingual-e5-small, multilingual-e5-base)",
            other
        ))),
    }
}

/// fastembed 임베딩 구현체
///
/// 모델은 첫 임베딩 호출 시 로드되어 재사용됩니다.
pub struct FastEmbedding {
    model_name: String,
    model: EmbeddingModel,
    dimension: usize,
    loaded: Arc<Mutex<Option<TextEmbedding>>>,
}

impl FastEmbedding {
    pub fn new() -> Result<Self, EmbeddingError> {
        Self::with_model(DEFAULT_MODEL)
    }

    pub fn with_model(name: &str) -> Result<Self, EmbeddingError> {
        let (model, dimension) = resolve_model(name)?;
        Ok(Self {
            model_name: format!("fastembed/{}", name),
            model,
            dimension,
            loaded: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| EmbeddingError::Unavailable("local model lock poisoned".to_string()))?;

            if guard.is_none() {
                tracing::info!("Loading local embedding model {:?}", model);
                let embedding = TextEmbedding::try_new(
                    InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| {
                    EmbeddingError::Unavailable(format!(
                        "Failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(embedding);
            }

            let embedding = guard.as_mut().ok_or_else(|| {
                EmbeddingError::Unavailable("local embedding model not loaded".to_string())
            })?;

            embedding
                .embed(texts, Some(BATCH_SIZE))
                .map_err(|e| EmbeddingError::InvalidResponse(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| EmbeddingError::Unavailable(format!("Local embedding task failed: {}", e)))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
