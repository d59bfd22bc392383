//! 리소스 로더 모듈
//!
//! 리소스 디스크립터 하나를 정규화된 텍스트 프래그먼트 목록으로 변환합니다.
//! - text: 로컬 파일 또는 http(s) 본문 (UTF-8)
//! - pdf: pdf-extract로 페이지별 추출
//! - docx / csv: zip+quick-xml / csv 크레이트
//! - webpage / recursive_url: scraper DOM 추출, 같은 호스트 BFS 크롤링
//! - youtube: 자막 트랙
//!
//! 모든 프래그먼트는 여기서 테넌트/출처 메타데이터를 부여받습니다.

mod office;
mod pdf;
mod web;
mod youtube;

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::LoadError;
use crate::types::{ChunkMetadata, Fragment, Metadata, ResourceDescriptor, ResourceKind};

/// recursive_url 기본 크롤링 깊이
pub const DEFAULT_MAX_DEPTH: usize = 2;

/// recursive_url 최대 페이지 수
pub const DEFAULT_MAX_CRAWL_PAGES: usize = 50;

/// youtube 기본 자막 언어
pub const DEFAULT_CAPTION_LANGUAGE: &str = "en";

// ============================================================================
// Raw Fragment
// ============================================================================

/// 출처 정보가 붙기 전의 추출 결과
#[derive(Debug, Clone, Default)]
pub(crate) struct RawFragment {
    pub(crate) text: String,
    /// 로더가 추가하는 메타데이터 (page_number, row, url 등)
    pub(crate) extra: Metadata,
}

impl RawFragment {
    pub(crate) fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extra: Metadata::new(),
        }
    }

    pub(crate) fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// Resource Loader
// ============================================================================

/// 리소스 로더
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    client: reqwest::Client,
    max_crawl_pages: usize,
}

impl Default for ResourceLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLoader {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("learnpath-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(
                    "Failed to build HTTP client ({}), falling back to defaults without user agent or timeout",
                    e
                );
                reqwest::Client::new()
            });

        Self {
            client,
            max_crawl_pages: DEFAULT_MAX_CRAWL_PAGES,
        }
    }

    /// 크롤링 페이지 상한 변경
    pub fn with_max_crawl_pages(mut self, max_pages: usize) -> Self {
        self.max_crawl_pages = max_pages.max(1);
        self
    }

    /// 리소스 로드
    ///
    /// 추출된 텍스트가 모두 비어 있으면 `LoadError::Empty`.
    pub async fn load(&self, descriptor: &ResourceDescriptor) -> Result<Vec<Fragment>, LoadError> {
        let location = descriptor.location.as_str();
        tracing::debug!("Loading {} resource: {}", descriptor.kind, location);

        let raw = match descriptor.kind {
            ResourceKind::Text => {
                let bytes = self.read_bytes(location).await?;
                vec![RawFragment::new(decode_utf8(bytes, location)?)]
            }
            ResourceKind::Pdf => {
                let bytes = self.read_bytes(location).await?;
                // pdf-extract는 CPU 바운드
                tokio::task::spawn_blocking(move || pdf::extract_pages(&bytes))
                    .await
                    .map_err(|e| LoadError::parse(location, e))?
                    .map_err(|e| LoadError::parse(location, e))?
            }
            ResourceKind::Docx => {
                let bytes = self.read_bytes(location).await?;
                office::extract_docx(&bytes).map_err(|e| LoadError::parse(location, e))?
            }
            ResourceKind::Csv => {
                let bytes = self.read_bytes(location).await?;
                office::extract_csv(&bytes).map_err(|e| LoadError::parse(location, e))?
            }
            ResourceKind::Webpage => web::load_page(&self.client, location).await?,
            ResourceKind::RecursiveUrl => {
                let max_depth = descriptor
                    .metadata_u64("max_depth")
                    .map(|d| d as usize)
                    .unwrap_or(DEFAULT_MAX_DEPTH);
                web::crawl(&self.client, location, max_depth, self.max_crawl_pages).await?
            }
            ResourceKind::Youtube => {
                let language = descriptor
                    .metadata_str("language")
                    .unwrap_or(DEFAULT_CAPTION_LANGUAGE);
                youtube::load_transcript(&self.client, location, language).await?
            }
        };

        let fragments = stamp(descriptor, raw)?;
        tracing::info!("Loaded {} fragments from {}", fragments.len(), location);

        Ok(fragments)
    }

    /// 로컬 경로, file:// URL, http(s) URL에서 바이트 읽기
    async fn read_bytes(&self, location: &str) -> Result<Vec<u8>, LoadError> {
        match local_path(location)? {
            Some(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| LoadError::fetch(location, e)),
            None => {
                let response = self
                    .client
                    .get(location)
                    .send()
                    .await
                    .map_err(|e| LoadError::fetch(location, e))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(LoadError::fetch(location, format!("HTTP {}", status)));
                }

                response
                    .bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(|e| LoadError::fetch(location, e))
            }
        }
    }
}

/// 위치 문자열 분류: 로컬 파일이면 `Some(path)`, http(s)면 `None`
fn local_path(location: &str) -> Result<Option<PathBuf>, LoadError> {
    if location.trim().is_empty() {
        return Err(LoadError::unsupported(location, "empty location"));
    }

    if !location.contains("://") {
        return Ok(Some(PathBuf::from(location)));
    }

    let url = Url::parse(location).map_err(|e| LoadError::unsupported(location, e))?;
    match url.scheme() {
        "http" | "https" => Ok(None),
        "file" => url
            .to_file_path()
            .map(Some)
            .map_err(|_| LoadError::unsupported(location, "invalid file URL")),
        other => Err(LoadError::unsupported(
            location,
            format!("unsupported URL scheme '{}'", other),
        )),
    }
}

fn decode_utf8(bytes: Vec<u8>, location: &str) -> Result<String, LoadError> {
    let text = String::from_utf8(bytes).map_err(|e| LoadError::parse(location, e))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// 출처 메타데이터 부여 및 빈 프래그먼트 제거
///
/// 로더 메타데이터가 같은 키의 호출자 메타데이터를 덮어씁니다.
fn stamp(descriptor: &ResourceDescriptor, raw: Vec<RawFragment>) -> Result<Vec<Fragment>, LoadError> {
    let fragments: Vec<Fragment> = raw
        .into_iter()
        .filter(|r| !r.text.trim().is_empty())
        .map(|r| {
            let mut metadata = ChunkMetadata::from_descriptor(descriptor);
            metadata.extra.extend(r.extra);
            Fragment {
                content: r.text.trim().to_string(),
                metadata,
            }
        })
        .collect();

    if fragments.is_empty() {
        return Err(LoadError::Empty {
            location: descriptor.location.clone(),
        });
    }

    Ok(fragments)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TenantId;
    use tempfile::TempDir;

    fn descriptor(path: &std::path::Path, kind: ResourceKind) -> ResourceDescriptor {
        ResourceDescriptor::new(
            path.to_string_lossy().to_string(),
            kind,
            TenantId::new("lp-1").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_load_text_file_stamps_provenance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "\u{feff}The mitochondria is the powerhouse of the cell.\n").unwrap();

        let descriptor = descriptor(&path, ResourceKind::Text).with_metadata("module", "cells");
        let fragments = ResourceLoader::new().load(&descriptor).await.unwrap();

        assert_eq!(fragments.len(), 1);
        assert_eq!(
            fragments[0].content,
            "The mitochondria is the powerhouse of the cell."
        );
        let meta = &fragments[0].metadata;
        assert_eq!(meta.tenant_id.as_str(), "lp-1");
        assert_eq!(meta.kind, ResourceKind::Text);
        assert_eq!(meta.source_location, descriptor.location);
        assert_eq!(meta.extra["module"], "cells");
    }

    #[tokio::test]
    async fn test_load_file_url() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Ribosomes make proteins.").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let descriptor = ResourceDescriptor::new(
            url.to_string(),
            ResourceKind::Text,
            TenantId::new("lp-1").unwrap(),
        );
        let fragments = ResourceLoader::new().load(&descriptor).await.unwrap();
        assert_eq!(fragments[0].content, "Ribosomes make proteins.");
    }

    #[tokio::test]
    async fn test_load_csv_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("glossary.csv");
        std::fs::write(
            &path,
            "term,definition\nmitochondria,powerhouse of the cell\nribosome,protein factory\n",
        )
        .unwrap();

        let fragments = ResourceLoader::new()
            .load(&descriptor(&path, ResourceKind::Csv))
            .await
            .unwrap();

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[1].metadata.extra["row"], 2);
        assert_eq!(fragments[1].metadata.kind, ResourceKind::Csv);
        assert!(fragments[1].content.contains("term: ribosome"));
    }

    #[tokio::test]
    async fn test_empty_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "  \n\n ").unwrap();

        let err = ResourceLoader::new()
            .load(&descriptor(&path, ResourceKind::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Empty { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let dir = TempDir::new().unwrap();
        let err = ResourceLoader::new()
            .load(&descriptor(&dir.path().join("nope.txt"), ResourceKind::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("binary.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0xc3]).unwrap();

        let err = ResourceLoader::new()
            .load(&descriptor(&path, ResourceKind::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4 garbage").unwrap();

        let err = ResourceLoader::new()
            .load(&descriptor(&path, ResourceKind::Pdf))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let descriptor = ResourceDescriptor::new(
            "ftp://example.com/notes.txt",
            ResourceKind::Text,
            TenantId::new("lp-1").unwrap(),
        );
        let err = ResourceLoader::new().load(&descriptor).await.unwrap_err();
        assert!(matches!(err, LoadError::Unsupported { .. }));
    }

    #[test]
    fn test_stamp_loader_metadata_wins() {
        let descriptor = ResourceDescriptor::new(
            "book.pdf",
            ResourceKind::Pdf,
            TenantId::new("lp-1").unwrap(),
        )
        .with_metadata("page_number", 99)
        .with_metadata("module", "cells");

        let raw = vec![
            RawFragment::new("  ").with("page_number", 1),
            RawFragment::new(" Page two ").with("page_number", 2),
        ];
        let fragments = stamp(&descriptor, raw).unwrap();

        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].content, "Page two");
        assert_eq!(fragments[0].metadata.extra["page_number"], 2);
        assert_eq!(fragments[0].metadata.extra["module"], "cells");
    }
}
