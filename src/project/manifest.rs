//! Manifest and metadata mutations.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use memchr::memmem;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use super::Project;
use super::scaffold::xhtml_document;
use crate::epub::package::{XHTML_MEDIA_TYPE, set_attr};
use crate::epub::{ManifestItem, MetaNode};
use crate::epub::paths::{
    default_folder, dir_of, encode_href, file_name_of, guess_media_type, join, relative_href,
    resolve_href, sanitize_file_name,
};
use crate::error::{Error, Result};
use crate::util::{decode_markup, escape_xml};

/// Attribute values and CSS constructs that hold a path to another file.
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?P<pre>\b(?:href|src|poster|data)\s*=\s*["']|url\(\s*["']?|@import\s+["'])"#,
        r#"(?P<path>[^"'#?)\s]+)"#,
    ))
    .expect("reference pattern is valid")
});

/// `srcset` holds a comma-separated list of `url [descriptor]` candidates.
static SRCSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<pre>\bsrcset\s*=\s*)(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
        .expect("srcset pattern is valid")
});

/// Result of [`Project::rename_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOutcome {
    pub id: String,
    pub old_href: String,
    pub new_href: String,
    /// Hrefs of files whose references were rewritten.
    pub files_updated: Vec<String>,
}

impl Project {
    /// Declare a new manifest item. The backing file is not created.
    pub fn add_to_manifest(
        &mut self,
        id: &str,
        href: &str,
        media_type: &str,
        properties: Option<&str>,
    ) -> Result<ManifestItem> {
        if self.items_by_id.contains_key(id) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        let target = resolve_href(self.opf_dir(), href);
        if self.items_by_href.contains_key(href) || self.item_at(&target).is_some() {
            return Err(Error::DuplicateHref(href.to_string()));
        }

        let mut item = ManifestItem::new(id, href, media_type);
        if let Some(properties) = properties {
            item = item.with_properties(properties);
        }
        self.package.manifest.push(item);
        self.persist()?;

        info!(%id, %href, %media_type, "added manifest item");
        self.require_item(id)
    }

    /// Copy an external file into the project and register it.
    ///
    /// The file goes into `folder` (relative to the package directory) or the
    /// default folder for its media type; name and id are made unique.
    pub fn add_file(&mut self, source: &Path, folder: Option<&str>) -> Result<ManifestItem> {
        let raw_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidName(source.display().to_string()))?;
        let name = sanitize_file_name(&raw_name)?;
        let media_type = guess_media_type(&name);

        let folder = folder.unwrap_or_else(|| default_folder(media_type));
        let dir = join(self.opf_dir(), folder.trim_matches('/'));
        let container_path = self.unique_container_path(&dir, &name);

        let destination = self.container_to_path(&container_path);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &destination)?;

        let id = self.unique_id(file_name_of(&container_path));
        let href = self.href_for(&container_path);
        self.add_to_manifest(&id, &href, media_type, None)
    }

    /// Create a new XHTML chapter under `Text/`, register it and append it
    /// to the spine.
    pub fn create_document(&mut self, name: &str, title: &str) -> Result<ManifestItem> {
        let mut name = sanitize_file_name(name)?;
        if Path::new(&name).extension().is_none() {
            name.push_str(".xhtml");
        }

        let dir = join(self.opf_dir(), default_folder(XHTML_MEDIA_TYPE));
        let container_path = self.unique_container_path(&dir, &name);

        let stylesheets: Vec<String> = self
            .package
            .manifest
            .iter()
            .filter(|i| i.is_css())
            .map(|i| relative_href(&container_path, &self.container_path(i)))
            .collect();
        let language = self.package.language().unwrap_or("en").to_string();
        let body = format!("  <h1>{}</h1>\n", escape_xml(title));
        let document = xhtml_document(title, &language, &stylesheets, &body);

        let destination = self.container_to_path(&container_path);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&destination, document)?;

        let id = self.unique_id(file_name_of(&container_path));
        let href = self.href_for(&container_path);
        self.add_to_manifest(&id, &href, XHTML_MEDIA_TYPE, None)?;
        self.spine_append(&id)?;
        self.require_item(&id)
    }

    /// Remove an item from the spine and manifest and delete its file.
    pub fn remove_from_manifest(&mut self, id_or_href: &str) -> Result<ManifestItem> {
        let item = self.require_item(id_or_href)?;
        let container_path = self.container_path(&item);

        self.package.spine.items.retain(|r| r.idref != item.id);
        if self.package.spine.toc.as_deref() == Some(item.id.as_str()) {
            self.package.spine.toc = None;
        }
        let opf_dir = self.opf_dir().to_string();
        self.package
            .guide
            .retain(|g| resolve_href(&opf_dir, &g.href) != container_path);

        match fs::remove_file(self.container_to_path(&container_path)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(href = %item.href, "backing file already absent");
            }
            Err(e) => return Err(Error::Io(e)),
        }

        self.package.manifest.retain(|i| i.id != item.id);
        self.persist()?;

        info!(id = %item.id, href = %item.href, "removed manifest item");
        Ok(item)
    }

    /// Rename an item's file within its directory.
    ///
    /// A `new_name` without an extension keeps the old one. With
    /// `update_references`, links to the file from content documents,
    /// stylesheets and the NCX are rewritten.
    pub fn rename_item(
        &mut self,
        id_or_href: &str,
        new_name: &str,
        update_references: bool,
    ) -> Result<RenameOutcome> {
        let item = self.require_item(id_or_href)?;
        let old_path = self.container_path(&item);

        let mut name = sanitize_file_name(new_name)?;
        if Path::new(&name).extension().is_none()
            && let Some(ext) = Path::new(file_name_of(&old_path)).extension()
        {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        let new_path = join(dir_of(&old_path), &name);

        if new_path == old_path {
            return Ok(RenameOutcome {
                id: item.id.clone(),
                old_href: item.href.clone(),
                new_href: item.href,
                files_updated: Vec::new(),
            });
        }

        let new_href = self.href_for(&new_path);
        let new_file = self.container_to_path(&new_path);
        if self.item_at(&new_path).is_some() || new_file.exists() {
            return Err(Error::DuplicateHref(new_href));
        }

        let old_file = self.container_to_path(&old_path);
        if !old_file.exists() {
            return Err(Error::MissingFile(old_file));
        }
        fs::rename(&old_file, &new_file)?;

        let opf_dir = self.opf_dir().to_string();
        for reference in &mut self.package.guide {
            if resolve_href(&opf_dir, &reference.href) == old_path {
                let fragment = reference.href.split_once('#').map(|(_, f)| f.to_string());
                reference.href = match fragment {
                    Some(f) => format!("{new_href}#{f}"),
                    None => new_href.clone(),
                };
            }
        }
        if let Some(entry) = self.package.item_mut(&item.id) {
            entry.href = new_href.clone();
        }
        self.persist()?;

        let files_updated = if update_references {
            self.rewrite_references(&old_path, &new_path)?
        } else {
            Vec::new()
        };

        info!(
            id = %item.id,
            old = %item.href,
            new = %new_href,
            updated = files_updated.len(),
            "renamed item"
        );
        Ok(RenameOutcome {
            id: item.id,
            old_href: item.href,
            new_href,
            files_updated,
        })
    }

    /// Point every reference to `old_path` at `new_path`.
    ///
    /// Only path-valued attributes and CSS `url()` / `@import` are touched,
    /// and only when the reference resolves to the renamed file.
    fn rewrite_references(&self, old_path: &str, new_path: &str) -> Result<Vec<String>> {
        let old_name = file_name_of(old_path);
        let old_encoded = encode_href(old_name);

        let mut updated = Vec::new();
        let candidates: Vec<ManifestItem> = self
            .package
            .manifest
            .iter()
            .filter(|i| i.is_html() || i.is_css() || i.is_ncx())
            .cloned()
            .collect();

        for item in candidates {
            let file_path = self.container_path(&item);
            let bytes = match self.read_bytes(&item) {
                Ok(bytes) => bytes,
                Err(Error::MissingFile(path)) => {
                    warn!(path = %path.display(), "skipping missing file during rename");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if memmem::find(&bytes, old_name.as_bytes()).is_none()
                && memmem::find(&bytes, old_encoded.as_bytes()).is_none()
            {
                continue;
            }

            let text = decode_markup(&bytes);
            let base = dir_of(&file_path);
            let relink = |path: &str| {
                (!path.contains(':') && resolve_href(base, path) == old_path)
                    .then(|| relative_href(&file_path, new_path))
            };
            let rewritten = REFERENCE_RE.replace_all(&text, |caps: &Captures<'_>| {
                match relink(&caps["path"]) {
                    Some(href) => format!("{}{href}", &caps["pre"]),
                    None => caps[0].to_string(),
                }
            });
            let rewritten = SRCSET_RE.replace_all(&rewritten, |caps: &Captures<'_>| {
                let (quote, list) = match (caps.name("dq"), caps.name("sq")) {
                    (Some(m), _) => ('"', m.as_str()),
                    (None, Some(m)) => ('\'', m.as_str()),
                    (None, None) => return caps[0].to_string(),
                };
                format!("{}{quote}{}{quote}", &caps["pre"], rewrite_srcset(list, &relink))
            });

            if rewritten != text {
                self.write_text(&item, &rewritten)?;
                updated.push(item.href.clone());
            }
        }
        Ok(updated)
    }

    /// Replace an item's `properties` token set.
    pub fn set_properties(&mut self, id_or_href: &str, properties: &str) -> Result<ManifestItem> {
        let item = self.require_item(id_or_href)?;
        if let Some(entry) = self.package.item_mut(&item.id) {
            entry.properties = properties.split_ascii_whitespace().map(str::to_string).collect();
        }
        self.persist()?;
        self.require_item(&item.id)
    }

    /// Make an item the cover image, for both EPUB 3 and EPUB 2 readers.
    pub fn set_cover_image(&mut self, id_or_href: &str) -> Result<ManifestItem> {
        let item = self.require_item(id_or_href)?;
        for entry in &mut self.package.manifest {
            if entry.id == item.id {
                entry.add_property("cover-image");
            } else {
                entry.remove_property("cover-image");
            }
        }

        let cover_meta = self
            .package
            .metadata
            .iter()
            .position(|m| m.name == "meta" && m.attr("name") == Some("cover"));
        match cover_meta {
            Some(index) => {
                set_attr(&mut self.package.metadata[index].attrs, "content", &item.id)
            }
            None if !self.package.is_epub3() => self.package.metadata.push(MetaNode {
                name: "meta".to_string(),
                attrs: vec![
                    ("name".to_string(), "cover".to_string()),
                    ("content".to_string(), item.id.clone()),
                ],
                text: None,
            }),
            None => {}
        }

        self.persist()?;
        info!(id = %item.id, "set cover image");
        self.require_item(&item.id)
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.package.set_title(title);
        self.persist()
    }

    pub fn set_language(&mut self, language: &str) -> Result<()> {
        self.package.set_language(language);
        self.persist()
    }

    pub fn set_creators(&mut self, creators: &[String]) -> Result<()> {
        self.package.set_creators(creators);
        self.persist()
    }
}

/// Apply `relink` to the URL of every `srcset` candidate, keeping
/// descriptors, fragments and spacing.
fn rewrite_srcset(list: &str, relink: impl Fn(&str) -> Option<String>) -> String {
    list.split(',')
        .map(|candidate| {
            let trimmed = candidate.trim_start();
            let lead = &candidate[..candidate.len() - trimmed.len()];
            let url_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
            let (url, descriptor) = trimmed.split_at(url_end);
            let path_end = url.find(['#', '?']).unwrap_or(url.len());
            match relink(&url[..path_end]) {
                Some(href) => format!("{lead}{href}{}{descriptor}", &url[path_end..]),
                None => candidate.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
