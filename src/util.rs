//! Text and XML helpers shared by the parsers and writers.

use std::borrow::Cow;
use std::ops::Range;

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252 (common in old ebooks)
///
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Decode a markup file, using its XML declaration as the encoding hint.
pub fn decode_markup(bytes: &[u8]) -> Cow<'_, str> {
    decode_text(bytes, extract_xml_encoding(bytes))
}

/// Extract the encoding name from an XML declaration.
///
/// Only the first ~100 bytes are checked.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let range = xml_encoding_range(bytes)?;
    std::str::from_utf8(&bytes[range]).ok()
}

/// Byte range of the `encoding` value in the XML declaration.
fn xml_encoding_range(bytes: &[u8]) -> Option<Range<usize>> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let value_start = xml_start + enc_pos + 9;
    let after_enc = &prefix[value_start..];

    if after_enc.is_empty() {
        return None;
    }

    let quote = after_enc[0];
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_len = after_enc[1..].iter().position(|&b| b == quote)?;
    Some(value_start + 1..value_start + 1 + value_len)
}

/// Rewrite a non-UTF-8 `encoding` in the XML declaration to `UTF-8`.
///
/// Decoded text is always written back as UTF-8.
pub fn declare_utf8(text: &str) -> Cow<'_, str> {
    let Some(range) = xml_encoding_range(text.as_bytes()) else {
        return Cow::Borrowed(text);
    };
    let label = &text.as_bytes()[range.clone()];
    if encoding_rs::Encoding::for_label(label) == Some(encoding_rs::UTF_8) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..range.start]);
    out.push_str("UTF-8");
    out.push_str(&text[range.end..]);
    Cow::Owned(out)
}

/// Strip UTF-8 BOM if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
pub fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve XML entity references.
///
/// `nbsp` is accepted as well since hand-edited XHTML uses it constantly.
pub fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        "nbsp" => return Some("\u{a0}".to_string()),
        _ => {}
    }

    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}

/// Replace entity references in raw attribute or text content.
///
/// Unknown entities are kept verbatim.
pub fn unescape_xml(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match after.find(';') {
            Some(semi) if semi > 0 && semi <= 10 => {
                let entity = &after[..semi];
                match resolve_entity(entity) {
                    Some(resolved) => out.push_str(&resolved),
                    None => {
                        out.push('&');
                        out.push_str(entity);
                        out.push(';');
                    }
                }
                rest = &after[semi + 1..];
            }
            _ => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decode a raw attribute value to an owned, unescaped string.
pub fn attr_string(value: &[u8]) -> String {
    unescape_xml(&String::from_utf8_lossy(value)).into_owned()
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Collapse whitespace runs (including NBSP) into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split(|c: char| c.is_whitespace()).filter(|w| !w.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Truncate to at most `max` characters, appending an ellipsis when cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", s[..idx].trim_end()),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bom() {
        let with_bom = &[0xEF, 0xBB, 0xBF, b'h', b'i'];
        assert_eq!(strip_bom(with_bom), b"hi");
        assert_eq!(strip_bom(b"hello"), b"hello");
        assert_eq!(strip_bom(&[]), &[]);

        let partial = &[0xEF, 0xBB, b'x'];
        assert_eq!(strip_bom(partial), partial);
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"title"), b"title");
        assert_eq!(local_name(b"dc:title"), b"title");
        assert_eq!(local_name(b"epub:type"), b"type");
        assert_eq!(local_name(b""), b"");
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp"), Some("&".to_string()));
        assert_eq!(resolve_entity("#65"), Some("A".to_string()));
        assert_eq!(resolve_entity("#x2019"), Some("\u{2019}".to_string()));
        assert_eq!(resolve_entity("nbsp"), Some("\u{a0}".to_string()));
        assert_eq!(resolve_entity("hellip"), None);
    }

    #[test]
    fn test_unescape_xml() {
        assert_eq!(unescape_xml("plain"), "plain");
        assert_eq!(unescape_xml("a &amp; b"), "a & b");
        assert_eq!(unescape_xml("&lt;p&gt;"), "<p>");
        assert_eq!(unescape_xml("&hellip; &#8217;"), "&hellip; \u{2019}");
        assert_eq!(unescape_xml("dangling & sign"), "dangling & sign");
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Chapter\n\t One \u{a0} "), "Chapter One");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exactly ten", 11), "exactly ten");
        assert_eq!(truncate_chars("a long sentence here", 6), "a long…");
        assert_eq!(truncate_chars("ééééé", 2), "éé…");
    }

    #[test]
    fn test_decode_text_fallback() {
        assert_eq!(decode_text(b"caf\xc3\xa9", None), "café");
        assert_eq!(decode_text(b"caf\xe9", None), "café");
    }

    #[test]
    fn test_extract_xml_encoding() {
        let bytes = br#"<?xml version="1.0" encoding="windows-1252"?><html/>"#;
        assert_eq!(extract_xml_encoding(bytes), Some("windows-1252"));
        assert_eq!(extract_xml_encoding(b"<html/>"), None);
    }

    #[test]
    fn test_declare_utf8() {
        let legacy = "<?xml version=\"1.0\" encoding='windows-1252'?>\n<p>Café</p>";
        assert_eq!(
            declare_utf8(legacy),
            "<?xml version=\"1.0\" encoding='UTF-8'?>\n<p>Café</p>"
        );

        let utf8 = r#"<?xml version="1.0" encoding="utf-8"?><p/>"#;
        assert!(matches!(declare_utf8(utf8), Cow::Borrowed(_)));
        assert!(matches!(declare_utf8("<p>Café</p>"), Cow::Borrowed(_)));
    }
}
