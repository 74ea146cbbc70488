//! The OPF package document held in memory.
//!
//! [`Package`] is the authoritative tree for a project: metadata children are
//! kept in document order with their attributes so that untouched entries
//! survive a rewrite, while the manifest and spine are typed for editing.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::util::{attr_string, escape_xml, local_name, resolve_entity, unescape_xml};

pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
pub const CSS_MEDIA_TYPE: &str = "text/css";

const OPF_NS: &str = "http://www.idpf.org/2007/opf";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Ordered `(qualified name, value)` attribute list.
pub type Attrs = Vec<(String, String)>;

/// One `<item>` of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Path relative to the package document's directory.
    pub href: String,
    pub media_type: String,
    /// Tokens of the `properties` attribute (`nav`, `cover-image`, ...).
    pub properties: Vec<String>,
    /// Attributes other than the four above (`fallback`, `media-overlay`).
    pub extra_attrs: Attrs,
}

impl ManifestItem {
    pub fn new(
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            properties: Vec::new(),
            extra_attrs: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: &str) -> Self {
        self.properties = split_tokens(properties);
        self
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    pub fn add_property(&mut self, property: &str) {
        if !self.has_property(property) {
            self.properties.push(property.to_string());
        }
    }

    pub fn remove_property(&mut self, property: &str) {
        self.properties.retain(|p| p != property);
    }

    /// XHTML or HTML content document.
    pub fn is_html(&self) -> bool {
        matches!(self.media_type.as_str(), XHTML_MEDIA_TYPE | "text/html")
    }

    pub fn is_css(&self) -> bool {
        self.media_type == CSS_MEDIA_TYPE
    }

    pub fn is_ncx(&self) -> bool {
        self.media_type == NCX_MEDIA_TYPE
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn is_font(&self) -> bool {
        self.media_type.starts_with("font/")
            || self.media_type.starts_with("application/font")
            || self.media_type == "application/vnd.ms-opentype"
            || self.media_type == "application/x-font-ttf"
    }
}

/// One `<itemref>` of the spine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineRef {
    pub idref: String,
    pub linear: bool,
    pub extra_attrs: Attrs,
}

impl SpineRef {
    pub fn new(idref: impl Into<String>) -> Self {
        Self {
            idref: idref.into(),
            linear: true,
            extra_attrs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spine {
    /// Manifest id of the EPUB 2 NCX, if declared.
    pub toc: Option<String>,
    /// Other attributes (`page-progression-direction`, ...).
    pub attrs: Attrs,
    pub items: Vec<SpineRef>,
}

/// A child of `<metadata>`, e.g. `dc:title` or `meta`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaNode {
    /// Qualified element name as written (`dc:title`, `meta`).
    pub name: String,
    pub attrs: Attrs,
    /// Text content; `None` for empty elements.
    pub text: Option<String>,
}

impl MetaNode {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            text: Some(text.into()),
        }
    }

    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        get_attr(&self.attrs, key)
    }

    /// OEB 1 packages capitalize Dublin Core names (`dc:Title`).
    fn is_dc(&self, local: &str) -> bool {
        self.name != "meta" && self.local_name().eq_ignore_ascii_case(local)
    }
}

/// A `<reference>` of the EPUB 2 guide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideRef {
    pub kind: String,
    pub title: Option<String>,
    pub href: String,
}

/// Parsed OPF package document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    /// Attributes of `<package>` (namespaces, version, unique-identifier).
    pub attrs: Attrs,
    pub metadata_attrs: Attrs,
    pub metadata: Vec<MetaNode>,
    pub manifest: Vec<ManifestItem>,
    pub spine: Spine,
    pub guide: Vec<GuideRef>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Outside,
    Metadata,
    Manifest,
    Spine,
    Guide,
}

impl Package {
    /// A minimal EPUB 3 package with the required metadata.
    pub fn new_epub3(identifier: &str, title: &str, language: &str) -> Self {
        let mut identifier_node = MetaNode::new("dc:identifier", identifier);
        identifier_node
            .attrs
            .push(("id".to_string(), "pub-id".to_string()));

        Self {
            attrs: vec![
                ("xmlns".to_string(), OPF_NS.to_string()),
                ("version".to_string(), "3.0".to_string()),
                ("unique-identifier".to_string(), "pub-id".to_string()),
                ("xml:lang".to_string(), language.to_string()),
            ],
            metadata_attrs: vec![("xmlns:dc".to_string(), DC_NS.to_string())],
            metadata: vec![
                identifier_node,
                MetaNode::new("dc:title", title),
                MetaNode::new("dc:language", language),
            ],
            ..Default::default()
        }
    }

    /// Parse an OPF package document.
    pub fn parse(content: &str) -> Result<Package> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(false);

        let mut package = Package::default();
        let mut seen_package = false;
        let mut section = Section::Outside;
        // Metadata child currently collecting text, plus nesting below it
        let mut current_meta: Option<MetaNode> = None;
        let mut meta_depth = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = e.name();
                    let local = local_name(name.as_ref());

                    if current_meta.is_some() {
                        meta_depth += 1;
                        continue;
                    }

                    match (section, local) {
                        (_, b"package") => {
                            seen_package = true;
                            package.attrs = collect_attrs(&e);
                        }
                        (Section::Outside, b"metadata") => {
                            section = Section::Metadata;
                            package.metadata_attrs = collect_attrs(&e);
                        }
                        (Section::Outside, b"manifest") => section = Section::Manifest,
                        (Section::Outside, b"spine") => {
                            section = Section::Spine;
                            read_spine_attrs(&e, &mut package.spine);
                        }
                        (Section::Outside, b"guide") => section = Section::Guide,
                        (Section::Metadata, b"dc-metadata" | b"x-metadata") => {
                            merge_namespace_attrs(&mut package.metadata_attrs, &e);
                        }
                        (Section::Metadata, _) => {
                            current_meta = Some(MetaNode {
                                name: qualified_name(&e),
                                attrs: collect_attrs(&e),
                                text: Some(String::new()),
                            });
                            meta_depth = 0;
                        }
                        (Section::Manifest, b"item") => package.manifest.push(read_item(&e)),
                        (Section::Spine, b"itemref") => package.spine.items.push(read_itemref(&e)),
                        (Section::Guide, b"reference") => {
                            if let Some(r) = read_reference(&e) {
                                package.guide.push(r);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Empty(e)) => {
                    if current_meta.is_some() {
                        continue;
                    }
                    let name = e.name();
                    let local = local_name(name.as_ref());

                    match (section, local) {
                        (Section::Outside, b"spine") => read_spine_attrs(&e, &mut package.spine),
                        (Section::Outside, b"metadata") => {
                            package.metadata_attrs = collect_attrs(&e)
                        }
                        (Section::Metadata, b"dc-metadata" | b"x-metadata") => {}
                        (Section::Metadata, _) => package.metadata.push(MetaNode {
                            name: qualified_name(&e),
                            attrs: collect_attrs(&e),
                            text: None,
                        }),
                        (Section::Manifest, b"item") => package.manifest.push(read_item(&e)),
                        (Section::Spine, b"itemref") => package.spine.items.push(read_itemref(&e)),
                        (Section::Guide, b"reference") => {
                            if let Some(r) = read_reference(&e) {
                                package.guide.push(r);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(text) = current_meta.as_mut().and_then(|m| m.text.as_mut()) {
                        text.push_str(&unescape_xml(&String::from_utf8_lossy(e.as_ref())));
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(text) = current_meta.as_mut().and_then(|m| m.text.as_mut()) {
                        text.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    if let Some(text) = current_meta.as_mut().and_then(|m| m.text.as_mut()) {
                        let entity = String::from_utf8_lossy(e.as_ref());
                        match resolve_entity(&entity) {
                            Some(resolved) => text.push_str(&resolved),
                            None => {
                                text.push('&');
                                text.push_str(&entity);
                                text.push(';');
                            }
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    if current_meta.is_some() {
                        if meta_depth > 0 {
                            meta_depth -= 1;
                        } else if let Some(mut node) = current_meta.take() {
                            node.text = node.text.map(|t| t.trim().to_string());
                            package.metadata.push(node);
                        }
                        continue;
                    }

                    let name = e.name();
                    match local_name(name.as_ref()) {
                        b"metadata" | b"manifest" | b"spine" | b"guide" => {
                            section = Section::Outside
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::Xml(e)),
                _ => {}
            }
        }

        if !seen_package {
            return Err(Error::MissingElement("package".into()));
        }

        Ok(package)
    }

    /// Serialize the package back to XML.
    pub fn to_xml(&self) -> String {
        let mut opf = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

        opf.push_str("<package");
        push_attrs(&mut opf, &self.attrs);
        opf.push_str(">\n  <metadata");
        push_attrs(&mut opf, &self.metadata_attrs);
        opf.push_str(">\n");

        for node in &self.metadata {
            opf.push_str("    <");
            opf.push_str(&node.name);
            push_attrs(&mut opf, &node.attrs);
            match &node.text {
                Some(text) => {
                    opf.push('>');
                    opf.push_str(&escape_xml(text));
                    opf.push_str("</");
                    opf.push_str(&node.name);
                    opf.push_str(">\n");
                }
                None => opf.push_str("/>\n"),
            }
        }

        opf.push_str("  </metadata>\n  <manifest>\n");
        for item in &self.manifest {
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"",
                escape_xml(&item.id),
                escape_xml(&item.href),
                escape_xml(&item.media_type)
            ));
            if !item.properties.is_empty() {
                opf.push_str(&format!(
                    " properties=\"{}\"",
                    escape_xml(&item.properties.join(" "))
                ));
            }
            push_attrs(&mut opf, &item.extra_attrs);
            opf.push_str("/>\n");
        }

        opf.push_str("  </manifest>\n  <spine");
        if let Some(toc) = &self.spine.toc {
            opf.push_str(&format!(" toc=\"{}\"", escape_xml(toc)));
        }
        push_attrs(&mut opf, &self.spine.attrs);
        opf.push_str(">\n");
        for itemref in &self.spine.items {
            opf.push_str(&format!(
                "    <itemref idref=\"{}\"",
                escape_xml(&itemref.idref)
            ));
            if !itemref.linear {
                opf.push_str(" linear=\"no\"");
            }
            push_attrs(&mut opf, &itemref.extra_attrs);
            opf.push_str("/>\n");
        }
        opf.push_str("  </spine>\n");

        if !self.guide.is_empty() {
            opf.push_str("  <guide>\n");
            for reference in &self.guide {
                opf.push_str(&format!(
                    "    <reference type=\"{}\"",
                    escape_xml(&reference.kind)
                ));
                if let Some(title) = &reference.title {
                    opf.push_str(&format!(" title=\"{}\"", escape_xml(title)));
                }
                opf.push_str(&format!(" href=\"{}\"/>\n", escape_xml(&reference.href)));
            }
            opf.push_str("  </guide>\n");
        }

        opf.push_str("</package>\n");
        opf
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub fn version(&self) -> Option<&str> {
        get_attr(&self.attrs, "version")
    }

    pub fn is_epub3(&self) -> bool {
        self.version().is_some_and(|v| v.starts_with('3'))
    }

    /// The `dc:identifier` named by `unique-identifier`, or the first one.
    pub fn identifier(&self) -> Option<&str> {
        let mut identifiers = self.metadata.iter().filter(|m| m.is_dc("identifier"));
        get_attr(&self.attrs, "unique-identifier")
            .and_then(|uid| {
                self.metadata
                    .iter()
                    .find(|m| m.is_dc("identifier") && m.attr("id") == Some(uid))
            })
            .or_else(|| identifiers.next())
            .and_then(|m| m.text.as_deref())
    }

    pub fn title(&self) -> Option<&str> {
        self.dc_text("title")
    }

    pub fn set_title(&mut self, title: &str) {
        self.set_dc_text("title", title);
    }

    pub fn language(&self) -> Option<&str> {
        self.dc_text("language")
    }

    pub fn set_language(&mut self, language: &str) {
        self.set_dc_text("language", language);
    }

    pub fn creators(&self) -> Vec<&str> {
        self.metadata
            .iter()
            .filter(|m| m.is_dc("creator"))
            .filter_map(|m| m.text.as_deref())
            .collect()
    }

    /// Replace all `dc:creator` entries, dropping refinements of removed ones.
    pub fn set_creators(&mut self, creators: &[String]) {
        let removed_ids: Vec<String> = self
            .metadata
            .iter()
            .filter(|m| m.is_dc("creator"))
            .filter_map(|m| m.attr("id").map(|id| format!("#{id}")))
            .collect();

        let insert_at = self
            .metadata
            .iter()
            .position(|m| m.is_dc("creator"))
            .or_else(|| {
                self.metadata
                    .iter()
                    .position(|m| m.is_dc("title"))
                    .map(|i| i + 1)
            })
            .unwrap_or(self.metadata.len());

        self.metadata.retain(|m| {
            !m.is_dc("creator")
                && !m
                    .attr("refines")
                    .is_some_and(|r| removed_ids.iter().any(|id| id == r))
        });

        let insert_at = insert_at.min(self.metadata.len());
        for (offset, creator) in creators.iter().enumerate() {
            self.metadata
                .insert(insert_at + offset, MetaNode::new("dc:creator", creator.as_str()));
        }
    }

    /// EPUB 3 `dcterms:modified` timestamp.
    pub fn modified(&self) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.name == "meta" && m.attr("property") == Some("dcterms:modified"))
            .and_then(|m| m.text.as_deref())
    }

    pub fn set_modified(&mut self, timestamp: &str) {
        if let Some(node) = self
            .metadata
            .iter_mut()
            .find(|m| m.name == "meta" && m.attr("property") == Some("dcterms:modified"))
        {
            node.text = Some(timestamp.to_string());
            return;
        }
        let mut node = MetaNode::new("meta", timestamp);
        node.attrs
            .push(("property".to_string(), "dcterms:modified".to_string()));
        self.metadata.push(node);
    }

    fn dc_text(&self, local: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.is_dc(local))
            .and_then(|m| m.text.as_deref())
    }

    fn set_dc_text(&mut self, local: &str, value: &str) {
        if let Some(node) = self.metadata.iter_mut().find(|m| m.is_dc(local)) {
            node.text = Some(value.to_string());
        } else {
            self.metadata
                .push(MetaNode::new(format!("dc:{local}"), value));
        }
    }

    // ------------------------------------------------------------------
    // Manifest lookups
    // ------------------------------------------------------------------

    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|i| i.id == id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut ManifestItem> {
        self.manifest.iter_mut().find(|i| i.id == id)
    }

    /// The EPUB 3 navigation document.
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|i| i.has_property("nav"))
    }

    /// The EPUB 2 NCX, preferring the one named by `spine@toc`.
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.spine
            .toc
            .as_deref()
            .and_then(|id| self.item(id))
            .or_else(|| self.manifest.iter().find(|i| i.is_ncx()))
    }

    /// Cover image, from the EPUB 3 property or the EPUB 2 `meta name="cover"`.
    pub fn cover_image_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|i| i.has_property("cover-image"))
            .or_else(|| {
                self.metadata
                    .iter()
                    .find(|m| m.name == "meta" && m.attr("name") == Some("cover"))
                    .and_then(|m| m.attr("content"))
                    .and_then(|id| self.item(id))
            })
    }
}

pub fn get_attr<'a>(attrs: &'a Attrs, key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn set_attr(attrs: &mut Attrs, key: &str, value: &str) {
    match attrs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value.to_string(),
        None => attrs.push((key.to_string(), value.to_string())),
    }
}

fn split_tokens(s: &str) -> Vec<String> {
    s.split_ascii_whitespace().map(str::to_string).collect()
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn collect_attrs(e: &BytesStart<'_>) -> Attrs {
    e.attributes()
        .flatten()
        .map(|attr| {
            (
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                attr_string(&attr.value),
            )
        })
        .collect()
}

/// Lift namespace declarations of an EPUB 2 `dc-metadata` wrapper onto
/// `<metadata>`, where the flattened children are written back.
fn merge_namespace_attrs(attrs: &mut Attrs, e: &BytesStart<'_>) {
    for (key, value) in collect_attrs(e) {
        if key.starts_with("xmlns:") && get_attr(attrs, &key).is_none() {
            attrs.push((key, value));
        }
    }
}

fn push_attrs(out: &mut String, attrs: &Attrs) {
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_xml(value));
        out.push('"');
    }
}

fn read_item(e: &BytesStart<'_>) -> ManifestItem {
    let mut item = ManifestItem::new(String::new(), String::new(), String::new());
    for (key, value) in collect_attrs(e) {
        match key.as_str() {
            "id" => item.id = value,
            "href" => item.href = value,
            "media-type" => item.media_type = value,
            "properties" => item.properties = split_tokens(&value),
            _ => item.extra_attrs.push((key, value)),
        }
    }
    item
}

fn read_itemref(e: &BytesStart<'_>) -> SpineRef {
    let mut itemref = SpineRef::new(String::new());
    for (key, value) in collect_attrs(e) {
        match key.as_str() {
            "idref" => itemref.idref = value,
            "linear" => itemref.linear = value != "no",
            _ => itemref.extra_attrs.push((key, value)),
        }
    }
    itemref
}

fn read_spine_attrs(e: &BytesStart<'_>, spine: &mut Spine) {
    for (key, value) in collect_attrs(e) {
        if key == "toc" {
            spine.toc = Some(value);
        } else {
            spine.attrs.push((key, value));
        }
    }
}

fn read_reference(e: &BytesStart<'_>) -> Option<GuideRef> {
    let attrs = collect_attrs(e);
    Some(GuideRef {
        kind: get_attr(&attrs, "type")?.to_string(),
        title: get_attr(&attrs, "title").map(str::to_string),
        href: get_attr(&attrs, "href")?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OPF: &str = r##"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="isbn">urn:isbn:999</dc:identifier>
    <dc:identifier id="BookId">urn:uuid:1234</dc:identifier>
    <dc:title>Tom &amp; Jerry</dc:title>
    <dc:creator id="c1">Author One</dc:creator>
    <meta refines="#c1" property="role">aut</meta>
    <dc:creator>Author Two</dc:creator>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">2024-01-15T00:00:00Z</meta>
    <meta name="cover" content="cover-id"/>
  </metadata>
  <manifest>
    <item id="nav" href="Text/nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="Text/chapter%201.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-id" href="Images/cover.png" media-type="image/png"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="css" href="Styles/style.css" media-type="text/css" fallback="ch1"/>
  </manifest>
  <spine toc="ncx" page-progression-direction="ltr">
    <itemref idref="ch1"/>
    <itemref idref="nav" linear="no"/>
  </spine>
  <guide>
    <reference type="text" title="Start" href="Text/chapter%201.xhtml"/>
  </guide>
</package>"##;

    #[test]
    fn test_parse_metadata() {
        let package = Package::parse(SAMPLE_OPF).unwrap();

        assert_eq!(package.version(), Some("3.0"));
        assert!(package.is_epub3());
        assert_eq!(package.identifier(), Some("urn:uuid:1234"));
        assert_eq!(package.title(), Some("Tom & Jerry"));
        assert_eq!(package.language(), Some("en"));
        assert_eq!(package.creators(), vec!["Author One", "Author Two"]);
        assert_eq!(package.modified(), Some("2024-01-15T00:00:00Z"));
    }

    #[test]
    fn test_parse_manifest_and_spine() {
        let package = Package::parse(SAMPLE_OPF).unwrap();

        assert_eq!(package.manifest.len(), 5);
        assert_eq!(package.manifest[1].href, "Text/chapter%201.xhtml");
        assert!(package.manifest[0].has_property("nav"));
        assert_eq!(
            package.manifest[4].extra_attrs,
            vec![("fallback".to_string(), "ch1".to_string())]
        );

        assert_eq!(package.spine.toc.as_deref(), Some("ncx"));
        assert_eq!(package.spine.items.len(), 2);
        assert!(package.spine.items[0].linear);
        assert!(!package.spine.items[1].linear);
        assert_eq!(package.guide.len(), 1);
    }

    #[test]
    fn test_special_items() {
        let package = Package::parse(SAMPLE_OPF).unwrap();

        assert_eq!(package.nav_item().map(|i| i.id.as_str()), Some("nav"));
        assert_eq!(package.ncx_item().map(|i| i.id.as_str()), Some("ncx"));
        assert_eq!(
            package.cover_image_item().map(|i| i.href.as_str()),
            Some("Images/cover.png")
        );
    }

    #[test]
    fn test_serialize_then_parse_preserves_tree() {
        let package = Package::parse(SAMPLE_OPF).unwrap();
        let reparsed = Package::parse(&package.to_xml()).unwrap();
        assert_eq!(package, reparsed);
    }

    #[test]
    fn test_set_creators_drops_refinements() {
        let mut package = Package::parse(SAMPLE_OPF).unwrap();
        package.set_creators(&["New Author".to_string()]);

        assert_eq!(package.creators(), vec!["New Author"]);
        assert!(!package
            .metadata
            .iter()
            .any(|m| m.attr("refines") == Some("#c1")));
    }

    #[test]
    fn test_set_title_and_modified() {
        let mut package = Package::new_epub3("urn:uuid:x", "Draft", "fr");
        assert_eq!(package.title(), Some("Draft"));
        assert_eq!(package.modified(), None);

        package.set_title("Final <Cut>");
        package.set_modified("2025-01-01T00:00:00Z");
        package.set_modified("2025-02-02T00:00:00Z");

        let reparsed = Package::parse(&package.to_xml()).unwrap();
        assert_eq!(reparsed.title(), Some("Final <Cut>"));
        assert_eq!(reparsed.modified(), Some("2025-02-02T00:00:00Z"));
        assert_eq!(reparsed.identifier(), Some("urn:uuid:x"));
        assert_eq!(reparsed.language(), Some("fr"));
    }

    #[test]
    fn test_legacy_metadata_wrapper() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata>
    <dc-metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
      <dc:Title>Legacy Book</dc:Title>
      <dc:Identifier id="uid">isbn-1</dc:Identifier>
      <dc:Language>en</dc:Language>
    </dc-metadata>
    <x-metadata>
      <meta name="cover" content="img"/>
    </x-metadata>
  </metadata>
  <manifest>
    <item id="img" href="cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine/>
</package>"#;

        let package = Package::parse(opf).unwrap();
        assert_eq!(package.metadata.len(), 4);
        assert_eq!(package.title(), Some("Legacy Book"));
        assert_eq!(package.identifier(), Some("isbn-1"));
        assert_eq!(package.language(), Some("en"));
        assert_eq!(
            package.cover_image_item().map(|i| i.id.as_str()),
            Some("img")
        );
        assert_eq!(get_attr(&package.metadata_attrs, "xmlns:dc"), Some(DC_NS));

        let reparsed = Package::parse(&package.to_xml()).unwrap();
        assert_eq!(reparsed, package);
        assert_eq!(reparsed.title(), Some("Legacy Book"));
    }

    #[test]
    fn test_parse_rejects_non_package() {
        assert!(matches!(
            Package::parse("<html><body/></html>"),
            Err(Error::MissingElement(_))
        ));
    }

    #[test]
    fn test_item_classification() {
        let css = ManifestItem::new("s", "s.css", "text/css");
        let font = ManifestItem::new("f", "f.otf", "font/otf");
        let img = ManifestItem::new("i", "i.jpg", "image/jpeg").with_properties("cover-image");

        assert!(css.is_css() && !css.is_html());
        assert!(font.is_font());
        assert!(img.is_image() && img.has_property("cover-image"));
    }
}
