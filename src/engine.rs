//! RAG 엔진 - 수집과 질의응답의 외부 진입점
//!
//! 임베딩 백엔드와 지식 저장소는 엔진 생성 시 고정됩니다.
//! 수집과 답변 모두 에러를 반환하지 않고 상태/응답 값에 담아 돌려줍니다.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::{EngineConfig, ModelConfiguration};
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{EngineError, StoreError};
use crate::generation::{create_language_model, AnswerGenerator, LanguageModel};
use crate::ingest::{IngestionOrchestrator, IngestionState};
use crate::knowledge::{KnowledgeStore, LanceKnowledgeStore, Retriever};
use crate::loader::ResourceLoader;
use crate::types::{ResourceDescriptor, TenantId};

/// LanceDB 디렉토리 이름 (data_dir 하위)
pub const KNOWLEDGE_DIR: &str = "knowledge.lance";

/// 답변 실패 시 사용자에게 보여줄 문구
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I couldn't answer that right now. Please try again in a moment.";

// ============================================================================
// AnswerResponse
// ============================================================================

/// 질의 응답 결과
///
/// 성공이면 `answer`, 실패면 `error`만 채워집니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: Option<String>,
    pub error: Option<String>,
}

impl AnswerResponse {
    pub fn success(answer: String) -> Self {
        Self {
            answer: Some(answer),
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            answer: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// 사용자 표시용 텍스트 (에러 원문은 노출하지 않음)
    pub fn display_text(&self) -> &str {
        match (&self.answer, &self.error) {
            (_, Some(_)) => APOLOGY_MESSAGE,
            (Some(answer), None) => answer,
            (None, None) => "",
        }
    }
}

// ============================================================================
// RagEngine
// ============================================================================

/// RAG 엔진
pub struct RagEngine {
    orchestrator: IngestionOrchestrator,
    /// API 키가 없으면 `None` (수집만 가능)
    generator: Option<AnswerGenerator>,
    store: Arc<dyn KnowledgeStore>,
}

impl RagEngine {
    /// 환경변수 설정으로 엔진 생성
    pub async fn from_env() -> Result<Self, EngineError> {
        let config = EngineConfig::from_env()?;
        Self::open(&config).await
    }

    /// `data_dir/knowledge.lance` LanceDB 저장소로 엔진 생성
    pub async fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        let store = LanceKnowledgeStore::open(&config.data_dir.join(KNOWLEDGE_DIR)).await?;
        Self::with_store(config, Arc::new(store))
    }

    /// 주어진 저장소로 엔진 생성
    ///
    /// 언어 모델 API 키가 없으면 답변 기능만 비활성화됩니다.
    pub fn with_store(
        config: &EngineConfig,
        store: Arc<dyn KnowledgeStore>,
    ) -> Result<Self, EngineError> {
        let embedder = create_embedder(config.embedding)?;

        let model = match create_language_model(config.model) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!("Answering disabled: {}", e);
                None
            }
        };

        Ok(Self::build(config, embedder, store, model))
    }

    /// 컴포넌트를 직접 주입하여 생성
    pub fn with_components(
        config: &EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn KnowledgeStore>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self::build(config, embedder, store, Some(model))
    }

    fn build(
        config: &EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn KnowledgeStore>,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        tracing::info!(
            "RAG engine ready: store={}, embedding={}",
            store.name(),
            embedder.name()
        );

        let orchestrator =
            IngestionOrchestrator::new(ResourceLoader::new(), embedder.clone(), store.clone())
                .with_concurrency(config.load_concurrency);

        let retriever = Retriever::new(embedder, store.clone());
        let generator = model.map(|model| {
            AnswerGenerator::new(retriever, model)
                .with_top_k(config.top_k)
                .with_short_circuit_empty_context(config.short_circuit_empty_context)
        });

        Self {
            orchestrator,
            generator,
            store,
        }
    }

    /// 리소스 배치를 수집하여 테넌트 지식 베이스를 교체
    pub async fn ingest(
        &self,
        resources: Vec<ResourceDescriptor>,
        tenant: TenantId,
        config: &ModelConfiguration,
    ) -> IngestionState {
        self.orchestrator.run(resources, tenant, config, None).await
    }

    /// 상태 전이를 `progress`로 전송하며 수집
    pub async fn ingest_with_progress(
        &self,
        resources: Vec<ResourceDescriptor>,
        tenant: TenantId,
        config: &ModelConfiguration,
        progress: mpsc::Sender<IngestionState>,
    ) -> IngestionState {
        self.orchestrator
            .run(resources, tenant, config, Some(progress))
            .await
    }

    /// 테넌트 지식 베이스로 질문에 답변
    pub async fn answer(&self, question: &str, tenant: &TenantId) -> AnswerResponse {
        let Some(generator) = &self.generator else {
            return AnswerResponse::failure(
                "language model not configured: set GEMINI_API_KEY or GOOGLE_AI_API_KEY",
            );
        };

        match generator.answer(question, tenant).await {
            Ok(answer) => AnswerResponse::success(answer),
            Err(e) => {
                tracing::warn!("Answer failed for tenant {}: {}", tenant, e);
                AnswerResponse::failure(e)
            }
        }
    }

    /// 테넌트의 저장된 청크 수
    pub async fn count(&self, tenant: &TenantId) -> Result<usize, StoreError> {
        self.store.count(tenant).await
    }

    pub fn can_answer(&self) -> bool {
        self.generator.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationModel;
    use crate::embedding::{EmbeddingBackend, HashingEmbedding};
    use crate::error::GenerationError;
    use crate::ingest::IngestionStatus;
    use crate::knowledge::InMemoryKnowledgeStore;
    use crate::types::ResourceKind;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 컨텍스트 첫 줄을 답으로 돌려주는 모델
    ///
    /// 컨텍스트가 비어 있으면 자료에 없다고 답합니다.
    struct ContextEchoModel;

    #[async_trait]
    impl LanguageModel for ContextEchoModel {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            let context = prompt
                .split("\"\"\"\n")
                .nth(1)
                .and_then(|rest| rest.split("\n\"\"\"").next())
                .unwrap_or("")
                .trim();

            Ok(match context.lines().next() {
                Some(line) if !line.is_empty() => line.to_string(),
                _ => "The provided materials do not cover this question.".to_string(),
            })
        }

        fn name(&self) -> &str {
            "context-echo"
        }
    }

    struct UnavailableModel;

    #[async_trait]
    impl LanguageModel for UnavailableModel {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("connection reset by peer".to_string()))
        }

        fn name(&self) -> &str {
            "unavailable"
        }
    }

    /// 인덱스를 열 수 없는 저장소
    struct UnavailableStore;

    #[async_trait]
    impl KnowledgeStore for UnavailableStore {
        async fn replace(
            &self,
            _tenant: &TenantId,
            _chunks: &[crate::types::Chunk],
            _vectors: &[Vec<f32>],
        ) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("Failed to list tables".to_string()))
        }

        async fn search(
            &self,
            _tenant: &TenantId,
            _query_vector: &[f32],
            _k: usize,
        ) -> Result<Vec<crate::knowledge::ScoredChunk>, StoreError> {
            Err(StoreError::Unavailable("Failed to list tables".to_string()))
        }

        async fn count(&self, _tenant: &TenantId) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("Failed to list tables".to_string()))
        }

        fn name(&self) -> &str {
            "unavailable"
        }
    }

    fn engine_with(model: Arc<dyn LanguageModel>) -> RagEngine {
        let config = EngineConfig {
            embedding: EmbeddingBackend::Hashing,
            ..EngineConfig::default()
        };
        RagEngine::with_components(
            &config,
            Arc::new(HashingEmbedding::new()),
            Arc::new(InMemoryKnowledgeStore::new()),
            model,
        )
    }

    fn write_resource(
        dir: &TempDir,
        name: &str,
        tenant: &TenantId,
        content: &str,
    ) -> ResourceDescriptor {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        ResourceDescriptor::new(
            path.to_string_lossy().to_string(),
            ResourceKind::Text,
            tenant.clone(),
        )
    }

    fn model_config() -> ModelConfiguration {
        ModelConfiguration::for_model(GenerationModel::Flash).unwrap()
    }

    #[test]
    fn test_display_text_hides_error() {
        let failure = AnswerResponse::failure("HTTP 500: internal stack trace");
        assert_eq!(failure.display_text(), APOLOGY_MESSAGE);
        assert!(failure.is_error());

        let success = AnswerResponse::success("ATP".to_string());
        assert_eq!(success.display_text(), "ATP");
        assert!(!success.is_error());
    }

    #[tokio::test]
    async fn test_answer_from_ingested_tenant() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(Arc::new(ContextEchoModel));
        let lp1 = TenantId::new("lp-1").unwrap();

        let resource = write_resource(
            &dir,
            "biology.txt",
            &lp1,
            "The mitochondria is the powerhouse of the cell.",
        );
        let state = engine.ingest(vec![resource], lp1.clone(), &model_config()).await;
        assert_eq!(state.status, IngestionStatus::Completed, "{:?}", state.error);

        let response = engine.answer("What is the powerhouse of the cell?", &lp1).await;
        assert!(response.error.is_none());
        assert!(response.answer.unwrap().contains("mitochondria"));
    }

    #[tokio::test]
    async fn test_other_tenant_never_sees_foreign_facts() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(Arc::new(ContextEchoModel));
        let lp1 = TenantId::new("lp-1").unwrap();
        let lp2 = TenantId::new("lp-2").unwrap();

        let biology = write_resource(
            &dir,
            "biology.txt",
            &lp1,
            "The mitochondria is the powerhouse of the cell.",
        );
        let geology = write_resource(
            &dir,
            "geology.txt",
            &lp2,
            "Rivers carve canyons through erosion over millions of years.",
        );
        engine.ingest(vec![biology], lp1.clone(), &model_config()).await;
        engine.ingest(vec![geology], lp2.clone(), &model_config()).await;

        let response = engine.answer("What is the powerhouse of the cell?", &lp2).await;
        let answer = response.answer.unwrap();
        assert!(!answer.contains("mitochondria"));
        assert!(answer.contains("Rivers"));

        assert_eq!(engine.count(&lp1).await.unwrap(), 1);
        assert_eq!(engine.count(&lp2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tenant_without_ingestion_answers_without_context() {
        let engine = engine_with(Arc::new(ContextEchoModel));
        let lp3 = TenantId::new("lp-3").unwrap();

        let response = engine.answer("What is the powerhouse of the cell?", &lp3).await;
        assert!(response.error.is_none());
        assert!(response.answer.unwrap().contains("do not cover"));
    }

    #[tokio::test]
    async fn test_model_failure_becomes_error_response() {
        let engine = engine_with(Arc::new(UnavailableModel));
        let response = engine
            .answer("anything", &TenantId::new("lp-1").unwrap())
            .await;

        assert!(response.answer.is_none());
        assert!(response.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_unavailable_index_becomes_error_response() {
        let config = EngineConfig {
            embedding: EmbeddingBackend::Hashing,
            ..EngineConfig::default()
        };
        let engine = RagEngine::with_components(
            &config,
            Arc::new(HashingEmbedding::new()),
            Arc::new(UnavailableStore),
            Arc::new(ContextEchoModel),
        );

        let response = engine
            .answer("What is the powerhouse of the cell?", &TenantId::new("lp-1").unwrap())
            .await;

        assert!(response.answer.is_none());
        assert!(response.error.unwrap().contains("knowledge store unavailable"));
    }

    #[tokio::test]
    async fn test_ingest_with_progress_reports_completion() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(Arc::new(ContextEchoModel));
        let lp1 = TenantId::new("lp-1").unwrap();
        let resource = write_resource(&dir, "notes.txt", &lp1, "Cells divide by mitosis.");

        let (tx, mut rx) = mpsc::channel(8);
        let state = engine
            .ingest_with_progress(vec![resource], lp1, &model_config(), tx)
            .await;

        let mut last = None;
        while let Some(update) = rx.recv().await {
            last = Some(update);
        }
        assert_eq!(last, Some(state));
    }

    #[tokio::test]
    async fn test_open_lance_engine() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            embedding: EmbeddingBackend::Hashing,
            ..EngineConfig::default()
        };
        let engine = RagEngine::open(&config).await.unwrap();
        let lp1 = TenantId::new("lp-1").unwrap();

        let resource = write_resource(&dir, "notes.txt", &lp1, "Cells divide by mitosis.");
        let state = engine.ingest(vec![resource], lp1.clone(), &model_config()).await;

        assert_eq!(state.status, IngestionStatus::Completed, "{:?}", state.error);
        assert_eq!(engine.count(&lp1).await.unwrap(), 1);
        assert!(dir.path().join(KNOWLEDGE_DIR).exists());
    }
}
