//! YouTube 자막 로더
//!
//! watch 페이지의 `captionTracks` 목록에서 언어에 맞는 트랙을 고르고
//! timedtext XML을 받아 자막 줄을 이어 붙입니다.

use std::sync::OnceLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Deserialize;

use crate::error::LoadError;

use super::RawFragment;

const WATCH_URL: &str = "https://www.youtube.com/watch";

/// 자막 트랙 (플레이어 응답의 `captionTracks` 항목)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    /// 자동 생성 자막이면 "asr"
    #[serde(default)]
    pub kind: Option<String>,
}

/// 동영상 자막 로드
pub(crate) async fn load_transcript(
    client: &reqwest::Client,
    location: &str,
    language: &str,
) -> Result<Vec<RawFragment>, LoadError> {
    let id = video_id(location)
        .ok_or_else(|| LoadError::unsupported(location, "not a YouTube video URL"))?;

    tracing::info!("Fetching YouTube captions: {} ({})", id, language);

    let watch_page = get_text(client, &format!("{}?v={}", WATCH_URL, id), location).await?;
    let tracks = parse_caption_tracks(&watch_page)
        .map_err(|e| LoadError::parse(location, e))?
        .ok_or_else(|| LoadError::unsupported(location, "video has no captions"))?;

    let track = select_track(&tracks, language)
        .ok_or_else(|| LoadError::unsupported(location, "video has no captions"))?;

    if !track.language_code.starts_with(language) {
        tracing::warn!(
            "No '{}' captions for {}, using '{}'",
            language,
            id,
            track.language_code
        );
    }

    let xml = get_text(client, &track.base_url, location).await?;
    let transcript = parse_transcript(&xml).map_err(|e| LoadError::parse(location, e))?;

    let mut fragment = RawFragment::new(transcript)
        .with("video_id", id)
        .with("language", track.language_code.as_str());
    if track.kind.as_deref() == Some("asr") {
        fragment = fragment.with("auto_generated", true);
    }

    Ok(vec![fragment])
}

async fn get_text(client: &reqwest::Client, url: &str, location: &str) -> Result<String, LoadError> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .send()
        .await
        .map_err(|e| LoadError::fetch(location, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::fetch(location, format!("HTTP {}", status)));
    }

    response.text().await.map_err(|e| LoadError::fetch(location, e))
}

/// URL 또는 ID 문자열에서 11자리 동영상 ID 추출
pub(crate) fn video_id(location: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?:^|v=|youtu\.be/|/embed/|/shorts/|/live/|/v/)([A-Za-z0-9_-]{11})(?:$|[^A-Za-z0-9_-])",
            )
            .ok()
        })
        .as_ref()?;

    pattern
        .captures(location.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// watch 페이지 HTML에서 자막 트랙 목록 추출
///
/// 자막이 없는 영상이면 `Ok(None)`.
pub(crate) fn parse_caption_tracks(html: &str) -> Result<Option<Vec<CaptionTrack>>, String> {
    const MARKER: &str = "\"captionTracks\":";

    let Some(start) = html.find(MARKER) else {
        return Ok(None);
    };

    // 배열 하나만 읽고 뒤따르는 JSON은 무시
    let mut de = serde_json::Deserializer::from_str(&html[start + MARKER.len()..]);
    let tracks = Vec::<CaptionTrack>::deserialize(&mut de).map_err(|e| e.to_string())?;

    Ok(if tracks.is_empty() { None } else { Some(tracks) })
}

/// 언어 일치 트랙 선택 (정확 일치 > 접두 일치 > 첫 트랙)
pub(crate) fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let exact = tracks
        .iter()
        .find(|t| t.language_code.eq_ignore_ascii_case(language));
    let prefix = || {
        tracks.iter().find(|t| {
            t.language_code
                .split('-')
                .next()
                .is_some_and(|base| base.eq_ignore_ascii_case(language))
        })
    };

    exact.or_else(prefix).or_else(|| tracks.first())
}

/// timedtext XML의 `<text>` 줄을 합쳐 하나의 문자열로
///
/// 자막 본문은 XML 이스케이프 안에 HTML 엔티티가 한 번 더 들어 있습니다
/// (`&amp;#39;`), 그래서 두 번 unescape 합니다.
pub(crate) fn parse_transcript(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut lines: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if matches!(e.name().as_ref(), b"text" | b"p") => {
                current = Some(String::new());
            }
            Ok(Event::Text(t)) => {
                if let Some(line) = current.as_mut() {
                    let once = t.unescape().map_err(|e| e.to_string())?;
                    let twice = quick_xml::escape::unescape(&once)
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| once.into_owned());
                    line.push_str(&twice);
                }
            }
            Ok(Event::End(e)) if matches!(e.name().as_ref(), b"text" | b"p") => {
                if let Some(line) = current.take() {
                    let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML error at {}: {}", reader.buffer_position(), e)),
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}
