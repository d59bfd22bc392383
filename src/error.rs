//! 에러 타입 모듈
//!
//! 엔진 컴포넌트별 에러 분류입니다.
//! - LoadError: 리소스 로딩 실패 (잘못된 URL, 손상된 파일, 빈 추출 결과)
//! - EmbeddingError: 임베딩 백엔드 실패
//! - StoreError: 지식 저장소 실패
//! - IngestError: 수집 실행 중 위 세 가지 중 하나
//! - RetrievalError / GenerationError: 질의응답 경로 실패
//!
//! 수집 실패는 `IngestionState.error`로, 답변 실패는 `AnswerResponse.error`로
//! 변환되어 호출자에게 전달됩니다.

use thiserror::Error;

/// 리소스 로딩 에러
#[derive(Debug, Error)]
pub enum LoadError {
    /// 네트워크/파일 읽기 실패
    #[error("failed to fetch {location}: {reason}")]
    Fetch { location: String, reason: String },

    /// 지원하지 않는 형식 또는 잘못된 위치
    #[error("unsupported resource {location}: {reason}")]
    Unsupported { location: String, reason: String },

    /// 파싱 실패 (손상된 PDF/DOCX/CSV 등)
    #[error("failed to parse {location}: {reason}")]
    Parse { location: String, reason: String },

    /// 추출된 텍스트가 없음
    #[error("no text extracted from {location}")]
    Empty { location: String },

    /// 수집 대상 테넌트와 리소스의 테넌트가 다름
    #[error("resource {location} belongs to tenant '{actual}', not '{expected}'")]
    TenantMismatch {
        location: String,
        expected: String,
        actual: String,
    },
}

impl LoadError {
    pub(crate) fn fetch(location: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(location: &str, reason: impl ToString) -> Self {
        Self::Unsupported {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn parse(location: &str, reason: impl ToString) -> Self {
        Self::Parse {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// 임베딩 에러
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("API key not found: set {0}")]
    MissingApiKey(&'static str),

    /// 백엔드 연결 실패
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),

    /// 백엔드가 요청을 거부함 (4xx/5xx, rate limit 포함)
    #[error("embedding backend rejected request ({status}): {message}")]
    Rejected { status: String, message: String },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("invalid embedding configuration: {0}")]
    InvalidConfig(String),
}

/// 지식 저장소 에러
#[derive(Debug, Error)]
pub enum StoreError {
    /// 인덱스 열기/연결 실패
    #[error("knowledge store unavailable: {0}")]
    Unavailable(String),

    /// 삭제/삽입/검색 실패
    #[error("knowledge store operation failed: {0}")]
    Operation(String),

    #[error("{chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("mixed vector dimensions in one write: {expected} and {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 다른 테넌트의 청크를 쓰려고 시도함
    #[error("chunk tagged with tenant '{actual}' written to tenant '{expected}'")]
    TenantMismatch { expected: String, actual: String },
}

/// 검색 에러 (질문 임베딩 또는 저장소 검색 실패)
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 답변 생성 에러
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("API key not found: set {0}")]
    MissingApiKey(&'static str),

    /// 언어 모델 호출 실패 (네트워크, 타임아웃)
    #[error("language model unavailable: {0}")]
    Unavailable(String),

    #[error("language model rejected request ({status}): {message}")]
    Rejected { status: String, message: String },

    #[error("invalid language model response: {0}")]
    InvalidResponse(String),
}

/// 수집 실행 에러 (`IngestionState.error`로 기록됨)
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 엔진 초기화 에러
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 설정 에러
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid tenant id '{0}': expected 1-128 characters of [A-Za-z0-9_.:-]")]
    InvalidTenant(String),

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidChunkConfig { size: usize, overlap: usize },

    #[error("unknown generation model '{0}'")]
    UnknownModel(String),

    #[error("unknown embedding backend '{0}'")]
    UnknownBackend(String),

    #[error("unknown resource kind '{0}'")]
    UnknownKind(String),
}
