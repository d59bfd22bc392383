//! learnpath-rag - 학습 경로별 멀티 테넌트 지식 수집 및 RAG 엔진
//!
//! 업로드된 학습 자료(PDF, 웹 페이지, YouTube 자막 등)를 청크로 나누고 임베딩하여
//! 하나의 공유 LanceDB 인덱스에 테넌트(학습 경로) 단위로 저장합니다.
//! 질문은 해당 테넌트의 청크만 검색하여 답변합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod knowledge;
pub mod loader;
pub mod types;

// Re-exports
pub use config::{EngineConfig, GenerationModel, ModelConfiguration, ModelProfile};
pub use embedding::{
    create_embedder, embed_chunks, get_api_key, has_api_key, EmbeddingBackend, EmbeddingProvider,
    GeminiEmbedding, HashingEmbedding, OpenAiEmbedding,
};
#[cfg(feature = "local-embeddings-fastembed")]
pub use embedding::FastEmbedding;
pub use engine::{AnswerResponse, RagEngine};
pub use error::{
    ConfigError, EmbeddingError, EngineError, GenerationError, IngestError, LoadError,
    RetrievalError, StoreError,
};
pub use generation::{AnswerGenerator, GeminiModel, LanguageModel};
pub use ingest::{IngestionOrchestrator, IngestionState, IngestionStatus};
pub use knowledge::{
    split, ChunkConfig, InMemoryKnowledgeStore, KnowledgeStore, LanceKnowledgeStore, Retriever,
    ScoredChunk,
};
pub use loader::ResourceLoader;
pub use types::{Chunk, ChunkMetadata, Fragment, Metadata, ResourceDescriptor, ResourceKind, TenantId};
