//! Extraction of `id`-bearing elements from a content document.

use std::collections::{HashMap, HashSet};

use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::nav::xhtml_reader;
use crate::util::{
    attr_string, collapse_whitespace, local_name, resolve_entity, truncate_chars, unescape_xml,
};

/// Maximum length, in characters, of a hook's context excerpt.
pub const CONTEXT_CHARS: usize = 60;

/// Upper bound on raw text gathered per element before collapsing.
const GATHER_LIMIT: usize = CONTEXT_CHARS * 8;

/// An element carrying an `id`, usable as a cross-reference target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub file_href: String,
    pub hook_id: String,
    pub tag_name: String,
    pub context_text: String,
}

/// The hooks of one document, in document order.
#[derive(Debug, Clone, Default)]
pub struct FileHooks {
    href: String,
    hooks: Vec<Hook>,
    by_id: HashMap<String, usize>,
    duplicates: Vec<String>,
}

impl FileHooks {
    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    pub fn get(&self, id: &str) -> Option<&Hook> {
        self.by_id.get(id).map(|&i| &self.hooks[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Ids that occur more than once; only the first occurrence is a hook.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// Every id present in the document.
    pub fn ids(&self) -> HashSet<String> {
        self.by_id.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn set_href(&mut self, href: &str) {
        self.href = href.to_string();
        for hook in &mut self.hooks {
            hook.file_href = href.to_string();
        }
    }
}

fn element_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| matches!(a.key.as_ref(), b"id" | b"xml:id"))
        .map(|a| attr_string(&a.value))
        .filter(|id| !id.is_empty())
}

/// An element whose text is still being gathered.
struct Collector {
    hook: usize,
    depth: usize,
    text: String,
}

impl Collector {
    fn push(&mut self, text: &str) {
        if self.text.len() < GATHER_LIMIT {
            self.text.push_str(text);
        }
    }
}

fn context(text: &str) -> String {
    truncate_chars(&collapse_whitespace(text), CONTEXT_CHARS)
}

/// Record the element as a hook unless its id is missing or already seen.
fn add_hook(found: &mut FileHooks, e: &BytesStart<'_>) -> Option<usize> {
    let id = element_id(e)?;
    if found.by_id.contains_key(&id) {
        if !found.duplicates.contains(&id) {
            found.duplicates.push(id);
        }
        return None;
    }
    let index = found.hooks.len();
    found.hooks.push(Hook {
        file_href: found.href.clone(),
        hook_id: id.clone(),
        tag_name: String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned(),
        context_text: String::new(),
    });
    found.by_id.insert(id, index);
    Some(index)
}

fn feed_text(
    open: &mut [Collector],
    pending: &mut Vec<usize>,
    found: &mut FileHooks,
    text: &str,
) {
    for collector in open.iter_mut() {
        collector.push(text);
    }
    if !pending.is_empty() && !text.trim().is_empty() {
        let excerpt = context(text);
        for index in pending.drain(..) {
            found.hooks[index].context_text = excerpt.clone();
        }
    }
}

/// Find every element with an `id` in `xhtml`.
///
/// The context of an element is its own text; for empty elements (anchors
/// like `<a id="x"/>`) it is the text that follows. When an id occurs more
/// than once the first element keeps it and the id is listed in
/// [`FileHooks::duplicates`].
pub fn scan_hooks(file_href: &str, xhtml: &str) -> Result<FileHooks> {
    let mut reader = xhtml_reader(xhtml);
    let mut found = FileHooks {
        href: file_href.to_string(),
        ..FileHooks::default()
    };

    let mut open: Vec<Collector> = Vec::new();
    // empty elements waiting for the next piece of text
    let mut pending: Vec<usize> = Vec::new();

    loop {
        match reader.read_event().map_err(Error::Xml)? {
            Event::Start(e) => {
                for collector in open.iter_mut() {
                    collector.depth += 1;
                }
                if let Some(hook) = add_hook(&mut found, &e) {
                    open.push(Collector {
                        hook,
                        depth: 0,
                        text: String::new(),
                    });
                }
            }
            Event::Empty(e) => {
                if local_name(e.name().as_ref()) == b"br" {
                    for collector in open.iter_mut() {
                        collector.push(" ");
                    }
                }
                if let Some(hook) = add_hook(&mut found, &e) {
                    pending.push(hook);
                }
            }
            Event::Text(e) => {
                let text = unescape_xml(&String::from_utf8_lossy(e.as_ref())).into_owned();
                feed_text(&mut open, &mut pending, &mut found, &text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                feed_text(&mut open, &mut pending, &mut found, &text);
            }
            Event::GeneralRef(e) => {
                if let Some(text) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    feed_text(&mut open, &mut pending, &mut found, &text);
                }
            }
            Event::End(_) => {
                if let Some(last) = open.last()
                    && last.depth == 0
                    && let Some(done) = open.pop()
                {
                    found.hooks[done.hook].context_text = context(&done.text);
                }
                for collector in open.iter_mut() {
                    collector.depth = collector.depth.saturating_sub(1);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // unclosed elements at end of input
    for done in open {
        found.hooks[done.hook].context_text = context(&done.text);
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>T</title></head>
<body id="top">
  <h1 id="ch1">Chapter <em id="em1">One</em></h1>
  <p id="p1">First&nbsp;para &amp; more</p>
  <a id="anchor"/>
  <p>Text   after
     the anchor</p>
  <p id="p1">Duplicate</p>
  <p id="">No id</p>
</body>
</html>"#;

    #[test]
    fn test_scan_document_order() {
        let hooks = scan_hooks("Text/a.xhtml", DOC).unwrap();
        let ids: Vec<_> = hooks.hooks().iter().map(|h| h.hook_id.as_str()).collect();
        assert_eq!(ids, vec!["top", "ch1", "em1", "p1", "anchor"]);
        assert!(hooks.hooks().iter().all(|h| h.file_href == "Text/a.xhtml"));
    }

    #[test]
    fn test_context_text() {
        let hooks = scan_hooks("a.xhtml", DOC).unwrap();

        let ch1 = hooks.get("ch1").unwrap();
        assert_eq!(ch1.tag_name, "h1");
        assert_eq!(ch1.context_text, "Chapter One");
        assert_eq!(hooks.get("em1").unwrap().context_text, "One");
        assert_eq!(hooks.get("p1").unwrap().context_text, "First para & more");
        assert_eq!(hooks.get("anchor").unwrap().context_text, "Text after the anchor");
        assert_eq!(hooks.get("anchor").unwrap().tag_name, "a");
    }

    #[test]
    fn test_duplicates_keep_first() {
        let hooks = scan_hooks("a.xhtml", DOC).unwrap();
        assert_eq!(hooks.duplicates(), &["p1".to_string()]);
        assert_eq!(hooks.get("p1").unwrap().context_text, "First para & more");
        assert!(hooks.ids().contains("p1"));
        assert!(!hooks.contains(""));
    }

    #[test]
    fn test_context_is_truncated() {
        let long = "word ".repeat(40);
        let doc = format!("<html><body><p id=\"long\">{long}</p></body></html>");
        let hooks = scan_hooks("a.xhtml", &doc).unwrap();
        let text = &hooks.get("long").unwrap().context_text;
        assert!(text.ends_with('…'));
        assert!(text.chars().count() <= CONTEXT_CHARS + 1);
    }

    #[test]
    fn test_no_hooks() {
        let hooks = scan_hooks("a.xhtml", "<html><body><p>x</p></body></html>").unwrap();
        assert!(hooks.is_empty());
        assert!(hooks.ids().is_empty());
    }
}
