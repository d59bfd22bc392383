//! Text Chunking Module
//!
//! 재귀적 경계 인식 텍스트 분할을 제공합니다.
//! 문단 → 줄 → 문장 → 단어 → 문자 순서로 경계를 낮춰가며
//! `chunk_size` 이하의 조각을 만들고, 조각들을 병합하면서
//! 직전 청크의 끝부분(`chunk_overlap` 이하)을 다음 청크 앞에 남깁니다.
//!
//! 같은 입력과 같은 `ChunkConfig`는 항상 같은 청크 경계를 만듭니다.

use std::collections::VecDeque;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::types::{Chunk, Fragment};

/// 분할 경계 (우선순위 순). 빈 문자열은 문자 단위 폴백.
const SEPARATORS: [&str; 7] = ["\n\n", "\n", ". ", "? ", "! ", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정 (문자 수 기준)
///
/// `chunk_overlap < chunk_size`가 항상 보장됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidChunkConfig {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 경계 인식 청커
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 현재 경계로 나누고, 너무 긴 조각은 다음 경계로 재귀 분할
    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let rest = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split_inclusive(separator).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) <= self.config.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge_pieces(&fitting));
                fitting.clear();
            }

            if rest.is_empty() {
                chunks.push(piece.trim().to_string());
            } else {
                chunks.extend(self.split_recursive(piece, rest));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge_pieces(&fitting));
        }

        chunks
    }

    /// 조각들을 `chunk_size` 이하로 병합 (오버랩 유지)
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > size && !window.is_empty() {
                push_joined(&mut chunks, &window);

                // 오버랩 이하가 되고 새 조각이 들어갈 때까지 앞에서 제거
                while total > overlap || (total + len > size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks = self.split_recursive(text, &SEPARATORS);
        chunks.retain(|c| !c.is_empty());
        chunks
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Fragment Splitting
// ============================================================================

/// 프래그먼트를 청크로 분할
///
/// 프래그먼트 메타데이터를 각 청크에 복사하고 `chunk_index`,
/// `content_hash`(sha256)를 추가합니다. 프래그먼트 순서와
/// 프래그먼트 내 청크 순서가 유지됩니다.
pub fn split(fragments: &[Fragment], config: &ChunkConfig) -> Vec<Chunk> {
    let chunker = RecursiveChunker::new(*config);
    let mut chunks = Vec::new();

    for fragment in fragments {
        for (index, content) in chunker.chunk(&fragment.content).into_iter().enumerate() {
            let mut metadata = fragment.metadata.clone();
            metadata
                .extra
                .insert("chunk_index".to_string(), Value::from(index));
            metadata
                .extra
                .insert("content_hash".to_string(), Value::from(content_hash(&content)));

            chunks.push(Chunk { content, metadata });
        }
    }

    tracing::debug!(
        "{} split {} fragments into {} chunks (size={}, overlap={})",
        chunker.name(),
        fragments.len(),
        chunks.len(),
        config.chunk_size(),
        config.chunk_overlap()
    );

    chunks
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// 청크 내용 해시 (hex)
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

// ============================================================================
// Tests
// ============================================================================
