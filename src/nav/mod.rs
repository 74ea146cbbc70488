//! Navigation document generation from content headings.

mod headings;

use std::ops::RangeInclusive;

use tracing::{debug, info, warn};

pub use headings::{HeadingScan, IdAllocator, ScannedHeading, scan_headings};
pub(crate) use headings::xhtml_reader;

use crate::epub::package::XHTML_MEDIA_TYPE;
use crate::epub::paths::{dir_of, file_name_of, relative_href};
use crate::error::{Error, Result};
use crate::hooks::scan_hooks;
use crate::project::Project;
use crate::util::escape_xml;

/// Prefix of ids generated for headings that lack one.
pub const HEADING_ID_PREFIX: &str = "toc-";

/// One entry of the outline built from headings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingItem {
    pub level: u8,
    pub title: String,
    /// Container path of the document holding the heading.
    pub path: String,
    pub id: Option<String>,
    pub children: Vec<HeadingItem>,
}

impl HeadingItem {
    pub fn new(level: u8, title: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            path: path.into(),
            id: None,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Link to this heading from the file at container path `from`.
    pub fn href_from(&self, from: &str) -> String {
        let href = relative_href(from, &self.path);
        match &self.id {
            Some(id) => format!("{href}#{id}"),
            None => href,
        }
    }

    /// Number of entries in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(HeadingItem::count).sum::<usize>()
    }

    fn depth(&self) -> usize {
        1 + self.children.iter().map(HeadingItem::depth).max().unwrap_or(0)
    }
}

/// Options for [`Project::generate_nav_from_headings`].
#[derive(Debug, Clone)]
pub struct NavOptions {
    /// Heading levels to include (`1..=3` means h1 to h3).
    pub levels: RangeInclusive<u8>,
    /// Replace an existing navigation document.
    pub overwrite: bool,
    /// Give headings without an id a generated one, editing the source files.
    pub add_missing_ids: bool,
    /// Heading shown above the list.
    pub title: String,
}

impl Default for NavOptions {
    fn default() -> Self {
        Self {
            levels: 1..=3,
            overwrite: false,
            add_missing_ids: true,
            title: "Contents".to_string(),
        }
    }
}

/// Result of a navigation document generation.
#[derive(Debug, Clone)]
pub struct NavReport {
    pub nav_href: String,
    pub outline: Vec<HeadingItem>,
    /// Hrefs of content documents that received generated ids.
    pub modified_files: Vec<String>,
    /// Href of the NCX, when one was regenerated as well.
    pub ncx_href: Option<String>,
}

/// Nest a flat, document-ordered heading list by level.
///
/// Each heading becomes a child of the nearest preceding heading with a
/// smaller level; skipped levels (h1 then h3) nest directly.
pub fn build_outline(flat: Vec<HeadingItem>) -> Vec<HeadingItem> {
    fn attach(stack: &mut [HeadingItem], roots: &mut Vec<HeadingItem>, done: HeadingItem) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }

    let mut roots = Vec::new();
    let mut stack: Vec<HeadingItem> = Vec::new();

    for item in flat {
        while let Some(top) = stack.pop() {
            if top.level < item.level {
                stack.push(top);
                break;
            }
            attach(&mut stack, &mut roots, top);
        }
        stack.push(item);
    }
    while let Some(done) = stack.pop() {
        attach(&mut stack, &mut roots, done);
    }

    roots
}

/// Render an EPUB 3 navigation document located at container path `nav_path`.
pub fn render_nav_xhtml(
    title: &str,
    outline: &[HeadingItem],
    nav_path: &str,
    language: &str,
) -> String {
    fn write_list(out: &mut String, items: &[HeadingItem], nav_path: &str, indent: usize) {
        let pad = "  ".repeat(indent);
        out.push_str(&format!("{pad}<ol>\n"));
        for item in items {
            out.push_str(&format!(
                "{pad}  <li><a href=\"{}\">{}</a>",
                escape_xml(&item.href_from(nav_path)),
                escape_xml(&item.title)
            ));
            if item.children.is_empty() {
                out.push_str("</li>\n");
            } else {
                out.push('\n');
                write_list(out, &item.children, nav_path, indent + 2);
                out.push_str(&format!("{pad}  </li>\n"));
            }
        }
        out.push_str(&format!("{pad}</ol>\n"));
    }

    let mut body = String::from("  <nav epub:type=\"toc\" id=\"toc\">\n");
    body.push_str(&format!("    <h1>{}</h1>\n", escape_xml(title)));
    write_list(&mut body, outline, nav_path, 2);
    body.push_str("  </nav>\n");

    crate::project::xhtml_document(title, language, &[], &body)
}

/// Render an EPUB 2 NCX located at container path `ncx_path`.
pub fn render_ncx(
    identifier: &str,
    title: &str,
    outline: &[HeadingItem],
    ncx_path: &str,
) -> String {
    fn write_nav_point(
        ncx: &mut String,
        entry: &HeadingItem,
        ncx_path: &str,
        play_order: &mut usize,
        indent: usize,
    ) {
        let indent_str = "  ".repeat(indent);

        ncx.push_str(&format!(
            "{}<navPoint id=\"navpoint-{}\" playOrder=\"{}\">\n",
            indent_str, play_order, play_order
        ));
        ncx.push_str(&format!(
            "{}  <navLabel>\n{}    <text>{}</text>\n{}  </navLabel>\n",
            indent_str,
            indent_str,
            escape_xml(&entry.title),
            indent_str
        ));
        ncx.push_str(&format!(
            "{}  <content src=\"{}\"/>\n",
            indent_str,
            escape_xml(&entry.href_from(ncx_path))
        ));

        *play_order += 1;

        for child in &entry.children {
            write_nav_point(ncx, child, ncx_path, play_order, indent + 1);
        }

        ncx.push_str(&format!("{}</navPoint>\n", indent_str));
    }

    let depth = outline.iter().map(HeadingItem::depth).max().unwrap_or(1);

    let mut ncx = String::new();
    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
"#,
    );
    ncx.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"{}\"/>\n",
        escape_xml(identifier)
    ));
    ncx.push_str(&format!("    <meta name=\"dtb:depth\" content=\"{depth}\"/>\n"));
    ncx.push_str(
        r#"    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
"#,
    );
    ncx.push_str(&format!("    <text>{}</text>\n", escape_xml(title)));
    ncx.push_str("  </docTitle>\n  <navMap>\n");

    let mut play_order = 1;
    for entry in outline {
        write_nav_point(&mut ncx, entry, ncx_path, &mut play_order, 2);
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

impl Project {
    /// Build the navigation document from the headings of the spine
    /// documents and register it with `properties="nav"`.
    ///
    /// An existing nav is replaced only with `overwrite`. When the spine
    /// declares an NCX it is regenerated from the same outline.
    pub fn generate_nav_from_headings(&mut self, options: &NavOptions) -> Result<NavReport> {
        let existing_nav = self.package().nav_item().cloned();
        if let Some(nav) = &existing_nav
            && !options.overwrite
        {
            return Err(Error::NavExists(nav.href.clone()));
        }
        let nav_id = existing_nav.as_ref().map(|n| n.id.clone());

        let mut flat = Vec::new();
        let mut modified_files = Vec::new();
        let documents: Vec<_> = self
            .spine_items()
            .into_iter()
            .filter(|item| item.is_html() && Some(&item.id) != nav_id.as_ref())
            .cloned()
            .collect();

        for item in &documents {
            let path = self.container_path(item);
            let text = match self.read_text(item) {
                Ok(text) => text,
                Err(Error::MissingFile(file)) => {
                    warn!(file = %file.display(), "spine document missing, skipped in nav");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let scan = if options.add_missing_ids {
                let taken = scan_hooks(&item.href, &text)?.ids();
                let mut ids = IdAllocator::new(HEADING_ID_PREFIX, taken);
                scan_headings(&text, &options.levels, Some(&mut ids))?
            } else {
                scan_headings(&text, &options.levels, None)?
            };

            if let Some(rewritten) = &scan.rewritten {
                self.write_text(item, rewritten)?;
                modified_files.push(item.href.clone());
            }
            debug!(href = %item.href, headings = scan.headings.len(), "scanned headings");

            flat.extend(scan.headings.into_iter().map(|h| HeadingItem {
                level: h.level,
                title: h.text,
                path: path.clone(),
                id: h.id,
                children: Vec::new(),
            }));
        }

        let mut outline = build_outline(flat);
        // A nav list needs at least one entry
        if outline.is_empty() {
            match documents.first() {
                Some(first) => {
                    let path = self.container_path(first);
                    let title = match self.package().title() {
                        Some(title) if !title.trim().is_empty() => title.to_string(),
                        _ => file_name_of(&path).to_string(),
                    };
                    outline.push(HeadingItem::new(1, title, path));
                }
                None => warn!("spine has no documents, navigation list is empty"),
            }
        }

        let nav_path = match &existing_nav {
            Some(nav) => self.container_path(nav),
            None => {
                let dir = documents
                    .first()
                    .map(|first| dir_of(&self.container_path(first)).to_string())
                    .unwrap_or_else(|| self.opf_dir().to_string());
                self.unique_container_path(&dir, "nav.xhtml")
            }
        };
        let language = self.package().language().unwrap_or("en").to_string();
        let nav_doc = render_nav_xhtml(&options.title, &outline, &nav_path, &language);

        let nav_item = match existing_nav {
            Some(nav) => nav,
            None => {
                let id = self.unique_id("nav");
                let href = self.href_for(&nav_path);
                self.add_to_manifest(&id, &href, XHTML_MEDIA_TYPE, Some("nav"))?
            }
        };
        self.write_text(&nav_item, &nav_doc)?;

        let ncx_href = match self.package().ncx_item().cloned() {
            Some(ncx) if self.package().spine.toc.is_some() => {
                let ncx_path = self.container_path(&ncx);
                let identifier = self.package().identifier().unwrap_or_default().to_string();
                let title = self.package().title().unwrap_or_default().to_string();
                self.write_text(&ncx, &render_ncx(&identifier, &title, &outline, &ncx_path))?;
                Some(ncx.href)
            }
            _ => None,
        };

        if self.package().is_epub3() {
            self.touch_modified()?;
        }

        info!(
            nav = %nav_item.href,
            entries = outline.iter().map(HeadingItem::count).sum::<usize>(),
            modified = modified_files.len(),
            "generated navigation document"
        );
        Ok(NavReport {
            nav_href: nav_item.href,
            outline,
            modified_files,
            ncx_href,
        })
    }
}
