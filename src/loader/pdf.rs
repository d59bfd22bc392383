//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use super::RawFragment;

/// PDF에서 페이지별 텍스트 추출
///
/// 페이지 번호(1부터)와 총 페이지 수를 메타데이터로 붙입니다.
/// 텍스트가 없는 페이지는 건너뜁니다.
pub(crate) fn extract_pages(bytes: &[u8]) -> Result<Vec<RawFragment>, String> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())?;

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
        return Ok(vec![]);
    }

    let pages = split_pdf_pages(&text);
    let total_pages = pages.len();

    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| {
            RawFragment::new(text)
                .with("page_number", i + 1)
                .with("total_pages", total_pages)
        })
        .collect())
}

/// PDF 텍스트를 페이지별로 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    // 폼피드 문자 (\x0c)로 페이지 분리
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .collect();

    if pages.iter().filter(|p| !p.is_empty()).count() > 1 {
        // 끝의 빈 페이지 제거 (마지막 폼피드 뒤)
        let mut pages = pages;
        while pages.last().is_some_and(|p| p.is_empty()) {
            pages.pop();
        }
        return pages;
    }

    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content\x0c";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[1], "Page 2 content");
    }

    #[test]
    fn test_split_pdf_pages_keeps_blank_page_numbering() {
        let text = "Intro\x0c\x0cAfter blank";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["Intro", "", "After blank"]);
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let text = "Just some text without page breaks";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(extract_pages(b"definitely not a pdf").is_err());
    }
}
