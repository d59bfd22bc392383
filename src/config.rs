//! 설정 모듈
//!
//! 생성 모델 선택이 컨텍스트 윈도우와 기본 청킹 파라미터를 결정합니다.
//! 청커는 전역 테이블이 아니라 주입된 `ChunkConfig`를 받습니다.
//!
//! 환경변수:
//! - `LEARNPATH_RAG_DATA_DIR`: 데이터 디렉토리 (기본 ~/.learnpath-rag/)
//! - `LEARNPATH_RAG_MODEL`: 생성 모델 (기본 gemini-2.0-flash)
//! - `LEARNPATH_RAG_EMBEDDING`: 임베딩 백엔드 (기본 gemini)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingBackend;
use crate::error::ConfigError;
use crate::knowledge::ChunkConfig;

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 5;

/// 배치 내 동시 로딩 리소스 수
pub const DEFAULT_LOAD_CONCURRENCY: usize = 4;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.learnpath-rag/)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LEARNPATH_RAG_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".learnpath-rag")
}

// ============================================================================
// Generation Model
// ============================================================================

/// 생성 모델 선택
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationModel {
    #[serde(rename = "gemini-2.0-flash-lite")]
    FlashLite,
    #[default]
    #[serde(rename = "gemini-2.0-flash")]
    Flash,
    #[serde(rename = "gemini-1.5-pro")]
    Pro,
}

impl GenerationModel {
    pub const ALL: [GenerationModel; 3] = [
        GenerationModel::FlashLite,
        GenerationModel::Flash,
        GenerationModel::Pro,
    ];

    /// API 모델 ID
    pub fn model_id(&self) -> &'static str {
        match self {
            GenerationModel::FlashLite => "gemini-2.0-flash-lite",
            GenerationModel::Flash => "gemini-2.0-flash",
            GenerationModel::Pro => "gemini-1.5-pro",
        }
    }

    /// 모델별 파생 파라미터
    ///
    /// 작은 모델은 작은 청크, 큰 컨텍스트 모델은 큰 청크와 비례하는 오버랩.
    pub fn profile(&self) -> ModelProfile {
        match self {
            GenerationModel::FlashLite => ModelProfile {
                context_window_tokens: 8_192,
                chunk_size: 1_000,
                chunk_overlap: 100,
            },
            GenerationModel::Flash => ModelProfile {
                context_window_tokens: 32_768,
                chunk_size: 2_000,
                chunk_overlap: 200,
            },
            GenerationModel::Pro => ModelProfile {
                context_window_tokens: 1_048_576,
                chunk_size: 4_000,
                chunk_overlap: 400,
            },
        }
    }
}

impl fmt::Display for GenerationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_id())
    }
}

impl FromStr for GenerationModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.model_id().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownModel(s.to_string()))
    }
}

/// 모델에서 파생된 수치 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelProfile {
    pub context_window_tokens: usize,
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 오버랩 (문자 수)
    pub chunk_overlap: usize,
}

// ============================================================================
// ModelConfiguration
// ============================================================================

/// 생성 모델 설정 (모델 + 파생 파라미터)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfiguration {
    pub model: GenerationModel,
    pub context_window_tokens: usize,
    pub chunk: ChunkConfig,
}

impl ModelConfiguration {
    /// 모델의 기본 프로파일로 생성
    pub fn for_model(model: GenerationModel) -> Result<Self, ConfigError> {
        let profile = model.profile();
        Ok(Self {
            model,
            context_window_tokens: profile.context_window_tokens,
            chunk: ChunkConfig::new(profile.chunk_size, profile.chunk_overlap)?,
        })
    }

    /// 청킹 파라미터만 덮어쓰기
    pub fn with_chunk_config(mut self, chunk: ChunkConfig) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn chunk_config(&self) -> &ChunkConfig {
        &self.chunk
    }
}

// ============================================================================
// EngineConfig
// ============================================================================

/// 엔진 설정
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// LanceDB 등 데이터 저장 디렉토리
    pub data_dir: PathBuf,
    pub model: GenerationModel,
    /// 지식 저장소 수명 동안 고정되어야 함
    pub embedding: EmbeddingBackend,
    pub top_k: usize,
    pub load_concurrency: usize,
    /// 검색 결과가 없을 때 모델 호출 없이 고정 응답 반환
    pub short_circuit_empty_context: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            model: GenerationModel::default(),
            embedding: EmbeddingBackend::default(),
            top_k: DEFAULT_TOP_K,
            load_concurrency: DEFAULT_LOAD_CONCURRENCY,
            short_circuit_empty_context: false,
        }
    }
}

impl EngineConfig {
    /// 환경변수에서 설정 로드 (없는 항목은 기본값)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(model) = std::env::var("LEARNPATH_RAG_MODEL") {
            if !model.is_empty() {
                config.model = model.parse()?;
            }
        }

        if let Ok(backend) = std::env::var("LEARNPATH_RAG_EMBEDDING") {
            if !backend.is_empty() {
                config.embedding = backend.parse()?;
            }
        }

        tracing::debug!(
            "Engine config: model={}, embedding={}, data_dir={:?}",
            config.model,
            config.embedding,
            config.data_dir
        );

        Ok(config)
    }

    pub fn model_configuration(&self) -> Result<ModelConfiguration, ConfigError> {
        ModelConfiguration::for_model(self.model)
    }
}

// ============================================================================
// Tests
// ============================================================================
