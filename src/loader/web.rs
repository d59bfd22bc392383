//! 웹 페이지 로더 - URL 콘텐츠 추출 및 재귀 크롤링
//!
//! - webpage: 단일 페이지의 DOM 텍스트 추출
//! - recursive_url: 같은 호스트 링크를 `max_depth`까지 BFS로 수집
//!
//! 두 경우 모두 script/style/noscript 내용은 제거합니다.

use std::collections::{HashSet, VecDeque};

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::LoadError;

use super::RawFragment;

/// 본문 후보 셀렉터 (우선순위 순)
const CONTENT_SELECTORS: [&str; 6] = [
    "article",
    "main",
    "[role=main]",
    ".content",
    "#content",
    "body",
];

/// 텍스트에서 제외할 요소
const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// 파싱된 페이지
#[derive(Debug, Clone)]
pub(crate) struct ScrapedPage {
    pub title: Option<String>,
    pub content: String,
    /// href 원문 (상대 경로 포함)
    pub links: Vec<String>,
}

// ============================================================================
// Fetch
// ============================================================================

/// HTML 페이지 가져오기
async fn fetch_html(client: &reqwest::Client, url: &Url) -> Result<String, LoadError> {
    tracing::info!("Scraping: {}", url);

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| LoadError::fetch(url.as_str(), e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::fetch(url.as_str(), format!("HTTP {}", status)));
    }

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("html") || ct.starts_with("text/"))
        .unwrap_or(true);
    if !is_html {
        return Err(LoadError::unsupported(url.as_str(), "not an HTML page"));
    }

    response
        .text()
        .await
        .map_err(|e| LoadError::fetch(url.as_str(), e))
}

fn parse_url(location: &str) -> Result<Url, LoadError> {
    let url = Url::parse(location).map_err(|e| LoadError::unsupported(location, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LoadError::unsupported(
            location,
            format!("unsupported URL scheme '{}'", other),
        )),
    }
}

// ============================================================================
// Loaders
// ============================================================================

/// 단일 웹 페이지 로드
pub(crate) async fn load_page(
    client: &reqwest::Client,
    location: &str,
) -> Result<Vec<RawFragment>, LoadError> {
    let url = parse_url(location)?;
    let html = fetch_html(client, &url).await?;
    let page = parse_page(&html);

    Ok(vec![page_fragment(page, &url)])
}

/// 같은 호스트 안에서 BFS 크롤링
///
/// 루트는 depth 0이며 depth < `max_depth`인 페이지만 수집합니다.
/// 루트 실패는 에러, 하위 페이지 실패는 경고 후 건너뜁니다.
pub(crate) async fn crawl(
    client: &reqwest::Client,
    location: &str,
    max_depth: usize,
    max_pages: usize,
) -> Result<Vec<RawFragment>, LoadError> {
    let root = parse_url(location)?;
    let max_depth = max_depth.max(1);

    let mut queue: VecDeque<(Url, usize)> = VecDeque::from([(root.clone(), 0)]);
    let mut visited: HashSet<String> = HashSet::from([normalize(&root)]);
    let mut fragments = Vec::new();

    while let Some((url, depth)) = queue.pop_front() {
        if fragments.len() >= max_pages {
            tracing::warn!("Crawl page limit ({}) reached at {}", max_pages, root);
            break;
        }

        let html = match fetch_html(client, &url).await {
            Ok(html) => html,
            Err(e) if depth == 0 => return Err(e),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", url, e);
                continue;
            }
        };

        let page = parse_page(&html);

        if depth + 1 < max_depth {
            for link in child_links(&url, &page.links) {
                if visited.insert(normalize(&link)) {
                    queue.push_back((link, depth + 1));
                }
            }
        }

        fragments.push(page_fragment(page, &url).with("depth", depth));
    }

    tracing::info!("Crawled {} pages from {}", fragments.len(), root);
    Ok(fragments)
}

fn page_fragment(page: ScrapedPage, url: &Url) -> RawFragment {
    let fragment = RawFragment::new(page.content).with("url", url.as_str());
    match page.title {
        Some(title) => fragment.with("title", title),
        None => fragment,
    }
}

/// 같은 호스트의 http(s) 자식 링크 (프래그먼트 제거)
fn child_links(base: &Url, hrefs: &[String]) -> Vec<Url> {
    hrefs
        .iter()
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .filter(|url| url.host_str() == base.host_str())
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .collect()
}

fn normalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.as_str().trim_end_matches('/').to_string()
}

// ============================================================================
// HTML Parsing
// ============================================================================

/// HTML 파싱 (제목, 본문, 링크)
pub(crate) fn parse_page(html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    ScrapedPage {
        title: extract_title(&document),
        content: extract_content(&document),
        links: extract_links(&document),
    }
}

/// 제목 추출 (<title> → <h1>)
fn extract_title(document: &Html) -> Option<String> {
    for selector_str in ["title", "h1"] {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let title = element.text().collect::<String>().trim().to_string();
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }

    None
}

/// 본문 추출 (우선순위: article > main > body)
fn extract_content(document: &Html) -> String {
    for selector_str in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = visible_text(&element);
                if text.len() > 100 {
                    return text;
                }
            }
        }
    }

    // 폴백: 전체 body 텍스트
    if let Ok(selector) = Selector::parse("body") {
        if let Some(element) = document.select(&selector).next() {
            return visible_text(&element);
        }
    }

    String::new()
}

fn extract_links(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return vec![];
    };

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// 요소의 보이는 텍스트 (script/style 제외, 공백 정리)
fn visible_text(element: &ElementRef) -> String {
    let mut text = String::new();

    for node in element.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }

        let trimmed = fragment.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    // 연속 공백 정리
    match Regex::new(r"\s+") {
        Ok(re) => re.replace_all(&text, " ").trim().to_string(),
        Err(_) => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

// ============================================================================
// Tests
// ============================================================================
