//! Knowledge 모듈 - 멀티 테넌트 RAG 지식 저장소
//!
//! - Chunker: 재귀 경계 인식 텍스트 분할
//! - Store: 테넌트 범위 replace/search 트레이트
//! - LanceDB: 공유 벡터 인덱스 (ANN)
//! - Memory: 전체 스캔 메모리 저장소
//! - Retriever: 질문 임베딩 + 테넌트 범위 top-k 검색

mod chunker;
mod lance;
mod memory;
mod retriever;
mod store;

// Re-exports
pub use chunker::{content_hash, split, ChunkConfig, Chunker, RecursiveChunker};
pub use lance::LanceKnowledgeStore;
pub use memory::InMemoryKnowledgeStore;
pub use retriever::Retriever;
pub use store::{cosine_similarity, validate_write, KnowledgeStore, ScoredChunk};
