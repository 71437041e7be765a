// DOCX body text: paragraphs of word/document.xml, one per line

use fancy_regex::Regex;
use std::io::{Cursor, Read};
use std::sync::LazyLock;

const DOCUMENT_PART: &str = "word/document.xml";

// Non-self-closing <w:p> elements
static PARAGRAPH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:p(?:\s[^>]*)?(?<!/)>(.*?)</w:p>").expect("valid regex")
});

// Text runs, tabs and line breaks inside a paragraph
static RUN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?(?<!/)>(.*?)</w:t>|<w:tab\s*/>|<w:br(?:\s[^>]*)?/>")
        .expect("valid regex")
});

pub(super) fn extract(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a DOCX archive: {e}"))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| format!("missing {DOCUMENT_PART}: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable {DOCUMENT_PART}: {e}"))?;

    paragraphs_text(&xml)
}

/// Non-empty trimmed paragraphs joined by newlines
pub(super) fn paragraphs_text(xml: &str) -> Result<String, String> {
    let mut paragraphs = Vec::new();

    for captures in PARAGRAPH_REGEX.captures_iter(xml) {
        let captures = captures.map_err(|e| e.to_string())?;
        let Some(body) = captures.get(1) else {
            continue;
        };

        let text = paragraph_text(body.as_str())?;
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            paragraphs.push(trimmed.to_string());
        }
    }

    Ok(paragraphs.join("\n"))
}

fn paragraph_text(body: &str) -> Result<String, String> {
    let mut text = String::new();

    for captures in RUN_REGEX.captures_iter(body) {
        let captures = captures.map_err(|e| e.to_string())?;
        match captures.get(1) {
            Some(run) => text.push_str(&decode_entities(run.as_str())),
            None => {
                let tag = captures.get(0).map_or("", |m| m.as_str());
                text.push(if tag.starts_with("<w:tab") { '\t' } else { '\n' });
            }
        }
    }

    Ok(text)
}

/// Decode the predefined XML entities and numeric character references
pub(super) fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        let decoded = after.find(';').and_then(|end| {
            let entity = &after[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end + 1))
        });

        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &after[consumed..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
