//! 공용 데이터 모델
//!
//! 테넌트(학습 경로) ID, 리소스 디스크립터, 프래그먼트, 청크 타입을 정의합니다.
//! 모든 청크는 원본 테넌트 ID를 메타데이터로 가지고 다닙니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// 메타데이터 맵 (호출자가 넘긴 임의의 키/값)
pub type Metadata = Map<String, Value>;

// ============================================================================
// TenantId
// ============================================================================

/// 테넌트 ID (학습 경로 ID)
///
/// 1~128자의 `[A-Za-z0-9_.:-]` 문자열만 허용합니다.
/// 지식 저장소의 모든 연산은 이 타입을 필수 인자로 받습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// 검증 후 생성
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= 128
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));

        if valid {
            Ok(Self(id))
        } else {
            Err(ConfigError::InvalidTenant(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

// ============================================================================
// ResourceKind
// ============================================================================

/// 리소스 종류 (로더 전략 선택)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Pdf,
    Youtube,
    Webpage,
    Text,
    Docx,
    Csv,
    /// 같은 호스트 내 링크를 `max_depth`까지 따라가는 크롤링
    RecursiveUrl,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Pdf,
        ResourceKind::Youtube,
        ResourceKind::Webpage,
        ResourceKind::Text,
        ResourceKind::Docx,
        ResourceKind::Csv,
        ResourceKind::RecursiveUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pdf => "pdf",
            ResourceKind::Youtube => "youtube",
            ResourceKind::Webpage => "webpage",
            ResourceKind::Text => "text",
            ResourceKind::Docx => "docx",
            ResourceKind::Csv => "csv",
            ResourceKind::RecursiveUrl => "recursive_url",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownKind(s.to_string()))
    }
}

// ============================================================================
// ResourceDescriptor
// ============================================================================

/// 수집 대상 리소스 디스크립터
///
/// 업로드 측에서 생성하며 수집 실행 동안 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// 파일 경로 또는 URL
    pub location: String,
    pub kind: ResourceKind,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ResourceDescriptor {
    pub fn new(location: impl Into<String>, kind: ResourceKind, tenant_id: TenantId) -> Self {
        Self {
            location: location.into(),
            kind,
            tenant_id,
            metadata: Metadata::new(),
        }
    }

    /// 메타데이터 항목 추가 (빌더)
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// 숫자 또는 숫자 문자열 메타데이터
    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        match self.metadata.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// ============================================================================
// Fragment / Chunk
// ============================================================================

/// 청크 메타데이터 (출처 정보)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub tenant_id: TenantId,
    pub source_location: String,
    pub kind: ResourceKind,
    /// 호출자 메타데이터 + 로더/청커가 추가한 항목 (page_number, chunk_index 등)
    #[serde(flatten)]
    pub extra: Metadata,
}

impl ChunkMetadata {
    /// 디스크립터의 출처 정보로 생성
    pub fn from_descriptor(descriptor: &ResourceDescriptor) -> Self {
        Self {
            tenant_id: descriptor.tenant_id.clone(),
            source_location: descriptor.location.clone(),
            kind: descriptor.kind,
            extra: descriptor.metadata.clone(),
        }
    }
}

/// 로더가 추출한 정규화된 텍스트 조각
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// 저장/검색 단위 청크
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn tenant_id(&self) -> &TenantId {
        &self.metadata.tenant_id
    }
}

// ============================================================================
// Tests
// ============================================================================
