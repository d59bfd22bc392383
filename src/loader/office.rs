//! DOCX / CSV 텍스트 추출
//!
//! - DOCX: zip 컨테이너의 `word/document.xml`에서 `<w:t>` 텍스트 수집
//! - CSV: 헤더 기준으로 행마다 `header: value` 줄로 렌더링

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use super::RawFragment;

/// ZIP 엔트리 최대 압축 해제 크기 (zip-bomb 방지)
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

// ============================================================================
// DOCX
// ============================================================================

/// DOCX 본문 텍스트 추출 (문단은 줄바꿈으로 구분)
pub(crate) fn extract_docx(bytes: &[u8]) -> Result<Vec<RawFragment>, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| e.to_string())?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err("word/document.xml exceeds size limit".to_string());
    }

    let text = docx_body_text(&xml)?;
    Ok(vec![RawFragment::new(text)])
}

fn docx_body_text(xml: &[u8]) -> Result<String, String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML error at {}: {}", reader.buffer_position(), e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim().to_string())
}

// ============================================================================
// CSV
// ============================================================================

/// CSV 행별 프래그먼트 추출 (`row`는 헤더 제외 1부터)
pub(crate) fn extract_csv(bytes: &[u8]) -> Result<Vec<RawFragment>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let mut fragments = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;

        let lines: Vec<String> = record
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.is_empty())
            .map(|(col, value)| match headers.get(col) {
                Some(header) if !header.is_empty() => format!("{}: {}", header, value),
                _ => value.to_string(),
            })
            .collect();

        if lines.is_empty() {
            continue;
        }

        fragments.push(RawFragment::new(lines.join("\n")).with("row", i + 1));
    }

    Ok(fragments)
}

// ============================================================================
// Tests
// ============================================================================
