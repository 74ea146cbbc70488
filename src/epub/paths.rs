//! Href arithmetic inside an EPUB container.
//!
//! Container paths are `/`-separated, relative to the project root and stored
//! decoded. Hrefs as written in documents are percent-encoded and relative to
//! the referencing file's directory.

use std::path::Path;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::error::{Error, Result};

/// Characters that must be escaped in an href path.
const HREF_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'[')
    .add(b']');

/// Characters rejected in file names.
const ILLEGAL_NAME_CHARS: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*', '#', '%'];

/// Split an href into its path and the fragment after `#`.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    }
}

/// Directory part of a container path (`""` for top-level files).
pub fn dir_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// File name part of a container path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Join a directory and a relative path without normalizing.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Resolve `href` against `base_dir` into a normalized container path.
///
/// The fragment and query are dropped and the path is percent-decoded.
/// `..` segments that would climb above the root are discarded.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let (path, _) = split_fragment(href);
    let path = path.split('?').next().unwrap_or(path);
    let decoded = percent_decode_str(path).decode_utf8_lossy();

    let mut segments: Vec<&str> = Vec::new();
    let base = if decoded.starts_with('/') { "" } else { base_dir };
    for segment in base.split('/').chain(decoded.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Relative, percent-encoded href from the file `from` to the file `to`.
///
/// Both arguments are container paths.
pub fn relative_href(from: &str, to: &str) -> String {
    let from_dirs: Vec<&str> = dir_of(from).split('/').filter(|s| !s.is_empty()).collect();
    let to_parts: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
    let (to_name, to_dirs) = match to_parts.split_last() {
        Some((name, dirs)) => (*name, dirs),
        None => return String::new(),
    };

    let common = from_dirs
        .iter()
        .zip(to_dirs.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::new();
    parts.extend(std::iter::repeat_n("..", from_dirs.len() - common));
    parts.extend(&to_dirs[common..]);
    parts.push(to_name);

    encode_href(&parts.join("/"))
}

/// Percent-encode a decoded path for use in an href.
pub fn encode_href(path: &str) -> String {
    utf8_percent_encode(path, HREF_ESCAPE).to_string()
}

/// Validate a user-supplied file name.
///
/// Whitespace runs become `_`. Rejects empty names, `.`/`..`, path separators,
/// control characters and characters illegal on common filesystems.
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidName("name is empty".into()));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(Error::InvalidName(trimmed.to_string()));
    }
    if let Some(c) = trimmed
        .chars()
        .find(|c| c.is_control() || ILLEGAL_NAME_CHARS.contains(c))
    {
        return Err(Error::InvalidName(format!(
            "'{trimmed}' contains illegal character {c:?}"
        )));
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut in_space = false;
    for c in trimmed.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    Ok(out)
}

/// Guess a media type from a file extension.
pub fn guess_media_type(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "xhtml" | "html" | "htm" => "application/xhtml+xml",
        "css" => "text/css",
        "js" => "application/javascript",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "m4a" | "mp4a" => "audio/mp4",
        "mp4" | "m4v" => "video/mp4",
        "smil" => "application/smil+xml",
        "ncx" => "application/x-dtbncx+xml",
        "opf" => "application/oebps-package+xml",
        _ => "application/octet-stream",
    }
}

/// Folder (relative to the package directory) new files of a type go into.
pub fn default_folder(media_type: &str) -> &'static str {
    match media_type {
        "application/xhtml+xml" | "text/html" => "Text",
        "text/css" => "Styles",
        t if t.starts_with("image/") => "Images",
        t if t.starts_with("font/") || t.starts_with("application/font") => "Fonts",
        t if t.starts_with("audio/") => "Audio",
        t if t.starts_with("video/") => "Video",
        _ => "Misc",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS", "Text/ch1.xhtml"), "OEBPS/Text/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/Text", "../Styles/a.css"), "OEBPS/Styles/a.css");
        assert_eq!(resolve_href("", "./a/./b.xhtml#frag"), "a/b.xhtml");
        assert_eq!(resolve_href("OEBPS", "chapter%201.xhtml?x=1"), "OEBPS/chapter 1.xhtml");
        assert_eq!(resolve_href("a", "../../../b.xhtml"), "b.xhtml");
    }

    #[test]
    fn test_relative_href() {
        assert_eq!(relative_href("Text/a.xhtml", "Text/b.xhtml"), "b.xhtml");
        assert_eq!(relative_href("Text/a.xhtml", "Styles/c.css"), "../Styles/c.css");
        assert_eq!(
            relative_href("Text/part/one.xhtml", "Styles/c.css"),
            "../../Styles/c.css"
        );
        assert_eq!(relative_href("nav.xhtml", "Text/ch 1.xhtml"), "Text/ch%201.xhtml");
        assert_eq!(relative_href("Text/a.xhtml", "Text/a.xhtml"), "a.xhtml");
    }

    #[test]
    fn test_split_helpers() {
        assert_eq!(split_fragment("a.xhtml#x"), ("a.xhtml", Some("x")));
        assert_eq!(split_fragment("a.xhtml"), ("a.xhtml", None));
        assert_eq!(dir_of("OEBPS/content.opf"), "OEBPS");
        assert_eq!(dir_of("content.opf"), "");
        assert_eq!(file_name_of("OEBPS/Text/a.xhtml"), "a.xhtml");
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("OEBPS/", "a"), "OEBPS/a");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("  My  Chapter.xhtml ").unwrap(), "My_Chapter.xhtml");
        assert_eq!(sanitize_file_name("café.css").unwrap(), "café.css");
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("   ").is_err());
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("a/b.xhtml").is_err());
        assert!(sanitize_file_name("what?.xhtml").is_err());
        assert!(sanitize_file_name("tab\u{7}.css").is_err());
    }

    #[test]
    fn test_guess_media_type_and_folder() {
        assert_eq!(guess_media_type("Text/a.XHTML"), "application/xhtml+xml");
        assert_eq!(guess_media_type("cover.jpeg"), "image/jpeg");
        assert_eq!(guess_media_type("noext"), "application/octet-stream");
        assert_eq!(default_folder("image/png"), "Images");
        assert_eq!(default_folder("font/woff2"), "Fonts");
        assert_eq!(default_folder("text/css"), "Styles");
        assert_eq!(default_folder("application/octet-stream"), "Misc");
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 _éü-]{1,8}".prop_filter("not dot segments", |s| s != "." && s != "..")
    }

    fn container_path() -> impl Strategy<Value = String> {
        prop::collection::vec(segment(), 1..5).prop_map(|parts| parts.join("/"))
    }

    proptest! {
        #[test]
        fn relative_href_resolves_back(from in container_path(), to in container_path()) {
            let href = relative_href(&from, &to);
            prop_assert_eq!(resolve_href(dir_of(&from), &href), to);
        }
    }
}
