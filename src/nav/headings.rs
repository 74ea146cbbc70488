//! Heading extraction from XHTML content documents.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::util::{collapse_whitespace, escape_xml, local_name, resolve_entity, unescape_xml};

/// A heading found in a document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedHeading {
    pub level: u8,
    pub text: String,
    pub id: Option<String>,
    /// True when `id` was generated by this scan.
    pub assigned: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HeadingScan {
    pub headings: Vec<ScannedHeading>,
    /// The document with generated ids spliced in, when any were added.
    pub rewritten: Option<String>,
}

/// Hands out ids of the form `{prefix}{n}` that are not already taken.
#[derive(Debug)]
pub struct IdAllocator {
    prefix: String,
    next: usize,
    taken: HashSet<String>,
}

impl IdAllocator {
    pub fn new(prefix: impl Into<String>, taken: HashSet<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
            taken,
        }
    }

    pub fn allocate(&mut self) -> String {
        loop {
            let candidate = format!("{}{}", self.prefix, self.next);
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Level of an `h1`..`h6` element name.
fn heading_level(name: &[u8]) -> Option<u8> {
    match local_name(name) {
        [h, d] if h.eq_ignore_ascii_case(&b'h') && (b'1'..=b'6').contains(d) => Some(d - b'0'),
        _ => None,
    }
}

fn id_attr(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| matches!(a.key.as_ref(), b"id" | b"xml:id"))
        .map(|a| unescape_xml(&String::from_utf8_lossy(&a.value)).into_owned())
        .filter(|id| !id.is_empty())
}

pub(crate) fn xhtml_reader(xhtml: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(xhtml);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    reader
}

struct OpenHeading {
    level: u8,
    id: Option<String>,
    insert_at: Option<usize>,
    text: String,
    depth: usize,
}

/// Extract headings whose level is within `levels`.
///
/// With an allocator, headings lacking an id get one spliced into their
/// start tag; nothing else in the document changes. Headings without text
/// are skipped and never receive an id.
pub fn scan_headings(
    xhtml: &str,
    levels: &RangeInclusive<u8>,
    mut ids: Option<&mut IdAllocator>,
) -> Result<HeadingScan> {
    let mut reader = xhtml_reader(xhtml);

    let mut headings = Vec::new();
    let mut insertions: Vec<(usize, String)> = Vec::new();
    let mut open: Option<OpenHeading> = None;

    loop {
        let event = reader.read_event().map_err(Error::Xml)?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(e) => {
                if let Some(heading) = open.as_mut() {
                    heading.depth += 1;
                    continue;
                }
                let Some(level) = heading_level(e.name().as_ref()) else {
                    continue;
                };
                if !levels.contains(&level) {
                    continue;
                }

                let mut heading = OpenHeading {
                    level,
                    id: id_attr(&e),
                    insert_at: None,
                    text: String::new(),
                    depth: 0,
                };
                if heading.id.is_none()
                    && ids.is_some()
                    && xhtml.as_bytes().get(end.wrapping_sub(1)) == Some(&b'>')
                {
                    heading.insert_at = Some(end - 1);
                }
                open = Some(heading);
            }
            Event::Empty(e) => {
                if let Some(heading) = open.as_mut()
                    && local_name(e.name().as_ref()) == b"br"
                {
                    heading.text.push(' ');
                }
            }
            Event::Text(e) => {
                if let Some(heading) = open.as_mut() {
                    heading
                        .text
                        .push_str(&unescape_xml(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Event::CData(e) => {
                if let Some(heading) = open.as_mut() {
                    heading.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if let Some(heading) = open.as_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    heading.text.push_str(&resolved);
                }
            }
            Event::End(_) => {
                let Some(heading) = open.as_mut() else {
                    continue;
                };
                if heading.depth > 0 {
                    heading.depth -= 1;
                    continue;
                }
                let Some(heading) = open.take() else {
                    continue;
                };

                let text = collapse_whitespace(&heading.text);
                if text.is_empty() {
                    continue;
                }
                let mut id = heading.id;
                let mut assigned = false;
                if let (Some(at), Some(alloc)) = (heading.insert_at, ids.as_deref_mut()) {
                    let new_id = alloc.allocate();
                    insertions.push((at, format!(" id=\"{}\"", escape_xml(&new_id))));
                    id = Some(new_id);
                    assigned = true;
                }
                headings.push(ScannedHeading {
                    level: heading.level,
                    text,
                    id,
                    assigned,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let rewritten = if insertions.is_empty() {
        None
    } else {
        let mut out = String::with_capacity(xhtml.len() + insertions.len() * 16);
        let mut last = 0;
        for (at, attr) in &insertions {
            out.push_str(&xhtml[last..*at]);
            out.push_str(attr);
            last = *at;
        }
        out.push_str(&xhtml[last..]);
        Some(out)
    };

    Ok(HeadingScan {
        headings,
        rewritten,
    })
}
