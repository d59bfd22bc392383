//! 답변 생성 모듈
//!
//! 테넌트 범위 검색 결과를 컨텍스트로 프롬프트를 만들고 언어 모델을 호출합니다.
//! 프롬프트는 고정 템플릿이며 컨텍스트 밖의 내용으로 답하지 않도록 지시합니다.

mod gemini;

pub use gemini::GeminiModel;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{GenerationModel, DEFAULT_TOP_K};
use crate::embedding::get_api_key;
use crate::error::GenerationError;
use crate::knowledge::{Retriever, ScoredChunk};
use crate::types::TenantId;

/// 컨텍스트가 비었을 때의 고정 답변 (`short_circuit_empty_context` 사용 시)
pub const NO_CONTEXT_ANSWER: &str =
    "I don't have enough information in this learning path's materials to answer that question.";

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 프롬프트에 대한 완성 텍스트
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

/// 설정된 모델로 Gemini 언어 모델 생성
pub fn create_language_model(
    model: GenerationModel,
) -> Result<Arc<dyn LanguageModel>, GenerationError> {
    let api_key = get_api_key().ok_or(GenerationError::MissingApiKey(
        "GEMINI_API_KEY or GOOGLE_AI_API_KEY",
    ))?;
    Ok(Arc::new(GeminiModel::new(api_key, model)?))
}

/// 검색 결과를 빈 줄로 이어 붙인 컨텍스트 블록 (검색 순서 유지)
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 답변 프롬프트 렌더링
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        r#"You are a study assistant for a learning path. Answer the question using ONLY the context below.

Rules:
1. Use only facts stated in the context. Do not rely on outside knowledge.
2. If the context does not contain enough information to answer, say that the provided materials do not cover it.
3. Never invent facts, sources, or quotations.
4. Keep the answer concise and format it in markdown.

Context:
"""
{context}
"""

Question: {question}

Answer:"#
    )
}

/// 답변 생성기
pub struct AnswerGenerator {
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
    short_circuit_empty_context: bool,
}

impl AnswerGenerator {
    pub fn new(retriever: Retriever, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            retriever,
            model,
            top_k: DEFAULT_TOP_K,
            short_circuit_empty_context: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// 검색 결과가 없으면 모델 호출 없이 `NO_CONTEXT_ANSWER` 반환
    pub fn with_short_circuit_empty_context(mut self, enabled: bool) -> Self {
        self.short_circuit_empty_context = enabled;
        self
    }

    /// 질문에 대한 답변 (모델 원문 그대로)
    pub async fn answer(&self, question: &str, tenant: &TenantId) -> Result<String, GenerationError> {
        let chunks = self.retriever.retrieve(question, tenant, self.top_k).await?;

        if chunks.is_empty() {
            tracing::info!("No context found for tenant {}", tenant);
            if self.short_circuit_empty_context {
                return Ok(NO_CONTEXT_ANSWER.to_string());
            }
        }

        let context = build_context(&chunks);
        let prompt = render_prompt(&context, question);

        tracing::debug!(
            "Generating answer with {} ({} context chunks, {} prompt chars)",
            self.model.name(),
            chunks.len(),
            prompt.len()
        );

        self.model.generate(&prompt).await
    }
}

// ============================================================================
// Tests
// ============================================================================
